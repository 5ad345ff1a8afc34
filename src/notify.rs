//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了通知接收器，用于把异步操作的成功/失败结果告知用户。

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 通知结果类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// 通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// 结果类型
    pub outcome: Outcome,
    /// 面向用户的消息
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Error,
            message: message.into(),
        }
    }
}

/// 通知接收器特征
///
/// 由UI提示层实现。核心不会持久化或重试通知。
pub trait NotificationSink: Send + Sync {
    /// 发送一条通知
    fn notify(&self, notification: Notification);
}

/// 基于日志的通知接收器
///
/// 没有UI层时使用，把通知写入tracing日志
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.outcome {
            Outcome::Success => info!(message = %notification.message, "notification"),
            Outcome::Error => warn!(message = %notification.message, "notification"),
        }
    }
}

/// 基于通道的通知接收器
///
/// 把通知转发到无界通道，供UI层消费
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// 创建通道接收器，同时返回消费端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // UI层已经关闭时丢弃
        if self.tx.send(notification).is_err() {
            warn!("Notification receiver dropped, discarding notification");
        }
    }
}

/// 静默接收器
///
/// 配置中关闭通知时使用
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}
