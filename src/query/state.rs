//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目的状态机。

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// 缓存条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// 尚未请求，或已被失效
    #[default]
    Idle,
    /// 请求进行中
    Loading,
    /// 最近一次请求成功
    Success,
    /// 最近一次请求失败
    Error,
}

/// 缓存条目
///
/// 状态转换：`Idle → Loading → Success | Error`，强制刷新时重新进入 `Loading`，
/// 失效时回到空的 `Idle`。
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct QueryState {
    /// 当前状态
    pub status: QueryStatus,
    /// 最近一次成功的结果
    pub data: Option<Value>,
    /// 错误信息，仅在 `Error` 状态下存在
    pub error: Option<SyncError>,
    /// 最近一次结算时间
    pub updated_at: Option<DateTime<Utc>>,
    /// 已结算的请求次数
    pub fetch_count: u64,
}

impl QueryState {
    /// 由一次请求结果构造独立的条目快照
    pub fn from_outcome(outcome: &Result<Value>) -> Self {
        let mut state = Self::default();
        state.settle(outcome);
        state
    }

    /// 进入加载状态
    ///
    /// 保留上一次的数据，便于调用方在刷新期间继续展示
    pub(crate) fn begin_loading(&mut self) {
        self.status = QueryStatus::Loading;
        self.error = None;
    }

    /// 按请求结果结算
    pub(crate) fn settle(&mut self, outcome: &Result<Value>) {
        match outcome {
            Ok(value) => {
                self.status = QueryStatus::Success;
                self.data = Some(value.clone());
                self.error = None;
            }
            Err(e) => {
                self.status = QueryStatus::Error;
                self.error = Some(e.clone());
            }
        }
        self.updated_at = Some(Utc::now());
        self.fetch_count += 1;
    }

    /// 是否已结算（成功或失败）
    pub fn is_settled(&self) -> bool {
        matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// 转换为结果
    ///
    /// 成功返回数据，失败返回保存的错误
    pub fn into_result(self) -> Result<Value> {
        match self.status {
            QueryStatus::Success => Ok(self.data.unwrap_or(Value::Null)),
            QueryStatus::Error => Err(self.error.unwrap_or_else(|| SyncError::Transport {
                status: None,
                message: "query failed without error payload".to_string(),
            })),
            QueryStatus::Idle | QueryStatus::Loading => Err(SyncError::UnknownQuery(
                "query has not settled".to_string(),
            )),
        }
    }
}
