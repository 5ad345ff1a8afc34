//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了数据访问层的错误类型和面向用户的错误消息映射。

use serde::Serialize;
use thiserror::Error;

/// 默认的通用错误提示
///
/// 传输层错误没有结构化消息时向用户展示此文本
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// 数据访问层错误类型枚举
///
/// 错误需要在去重的多个读取者之间共享，并保存在缓存条目上，
/// 因此所有变体都只携带可克隆的数据。
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SyncError {
    /// 传输错误：网络失败，或非2xx响应且没有结构化消息
    #[error("Transport error (status {status:?}): {message}")]
    Transport {
        /// HTTP状态码，网络层失败时为None
        status: Option<u16>,
        /// 内部诊断信息，不直接展示给用户
        message: String,
    },

    /// 应用错误：非2xx响应并携带结构化的 `message` 字段
    #[error("Application error (status {status}): {message}")]
    Application {
        /// HTTP状态码
        status: u16,
        /// 服务端返回的消息，原样展示给用户
        message: String,
    },

    /// 响应体解析失败
    #[error("Decode error: {0}")]
    Decode(String),

    /// 缓存键不合法（参数不是基本类型）
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// 请求参数不合法（例如缺少资源ID）
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 对从未读取过的键执行refetch
    #[error("Unknown query: {0}")]
    UnknownQuery(String),

    /// 未注册的变更名称
    #[error("Unknown mutation: {0}")]
    UnknownMutation(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(String),
}

impl SyncError {
    /// 获取面向用户的错误消息
    ///
    /// 应用错误原样返回服务端消息，其余错误返回通用提示
    ///
    /// # 参数
    ///
    /// * `fallback` - 通用错误提示
    ///
    /// # 返回值
    ///
    /// 返回应展示给用户的消息
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            SyncError::Application { message, .. } => message.clone(),
            _ => fallback.to_string(),
        }
    }

    /// 是否为传输层错误
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport { .. })
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return SyncError::Decode(e.to_string());
        }
        SyncError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// 数据访问层操作结果类型别名
pub type Result<T> = std::result::Result<T, SyncError>;
