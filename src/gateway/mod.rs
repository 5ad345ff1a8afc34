//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了资源网关接口：每个逻辑操作对应一次网络往返，不做缓存、不做重试。

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 资源操作类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// 列表查询
    List,
    /// 获取单个资源
    Get,
    /// 创建
    Create,
    /// 更新
    Update,
    /// 删除
    Delete,
    /// 自定义动作（例如 `cancel`、`comments`）
    Action(String),
}

impl Operation {
    /// 是否为只读操作
    pub fn is_read(&self) -> bool {
        matches!(self, Operation::List | Operation::Get)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List => write!(f, "list"),
            Operation::Get => write!(f, "get"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Action(name) => write!(f, "action:{}", name),
        }
    }
}

/// 资源网关特征
///
/// 给定 (资源名称, 操作, 参数)，执行恰好一次调用，返回解析后的输出或类型化的错误。
/// 传输错误和应用错误原样返回给调用方。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// 执行一次网关调用
    ///
    /// # 参数
    ///
    /// * `resource` - 资源名称（端点）
    /// * `operation` - 操作类型
    /// * `params` - 参数（列表过滤条件或请求体），单资源操作从 `id` 字段读取资源ID
    ///
    /// # 返回值
    ///
    /// 返回解析后的JSON输出
    async fn call(&self, resource: &str, operation: &Operation, params: &Value) -> Result<Value>;
}
