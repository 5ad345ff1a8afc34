//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! opscache - 运维控制台的数据访问层
//!
//! 提供按键缓存的查询层、变更执行器和声明式失效表，
//! 保证写操作成功后所有受影响的缓存读取都会重新请求。

#![doc(html_root_url = "https://docs.rs/opscache/0.1.0")]

pub use serde_json;
pub use tokio;

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod invalidation;
pub mod key;
pub mod metrics;
pub mod mutation;
pub mod notify;
pub mod query;
pub mod session;
pub mod telemetry;

// Re-export commonly used items
pub use catalog::Catalog;
pub use config::Config;
pub use error::{Result, SyncError};
pub use gateway::{http::HttpGateway, Operation, ResourceGateway};
pub use invalidation::{InvalidationMap, InvalidationTarget};
pub use key::{CacheKey, KeyPattern, ParamValue};
pub use mutation::{MutationDescriptor, MutationExecutor};
pub use notify::{ChannelSink, Notification, NotificationSink, NullSink, Outcome, TracingSink};
pub use query::{QueryCache, QueryState, QueryStatus};
pub use session::Session;

/// opscache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
