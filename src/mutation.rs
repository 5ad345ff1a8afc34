//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了变更描述和变更执行器。执行器运行一次写操作，
//! 成功后按描述失效缓存，并且每次调用只发送一条通知。

use crate::error::{Result, SyncError};
use crate::gateway::{Operation, ResourceGateway};
use crate::invalidation::InvalidationTarget;
use crate::notify::{Notification, NotificationSink};
use crate::query::QueryCache;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 变更描述
///
/// 声明写操作调用的网关操作以及成功后要失效的目标。无状态，每次调用求值一次。
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDescriptor {
    /// 变更名称，例如 `tickets.addComment`
    pub name: String,
    /// 资源名称（网关端点）
    pub resource: String,
    /// 网关操作
    pub operation: Operation,
    /// 成功后失效的目标，按顺序应用
    pub invalidates: Vec<InvalidationTarget>,
    /// 成功提示
    pub success_message: Option<String>,
    /// 传输错误时替代通用提示的消息
    pub failure_message: Option<String>,
}

impl MutationDescriptor {
    pub fn new(name: impl Into<String>, resource: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            operation,
            invalidates: Vec::new(),
            success_message: None,
            failure_message: None,
        }
    }

    /// 设置失效目标
    pub fn invalidates(mut self, targets: Vec<InvalidationTarget>) -> Self {
        self.invalidates = targets;
        self
    }

    /// 设置成功提示
    pub fn on_success(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    /// 设置失败提示
    pub fn on_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    fn success_text(&self) -> String {
        self.success_message
            .clone()
            .unwrap_or_else(|| format!("{} completed", self.name))
    }
}

/// 变更执行器
///
/// 持有网关、查询缓存和通知接收器的共享引用，克隆开销很小
#[derive(Clone)]
pub struct MutationExecutor {
    gateway: Arc<dyn ResourceGateway>,
    cache: QueryCache,
    notifier: Arc<dyn NotificationSink>,
    fallback_error: String,
    registry: Arc<HashMap<String, MutationDescriptor>>,
}

impl MutationExecutor {
    /// 创建新的变更执行器
    ///
    /// # 参数
    ///
    /// * `gateway` - 资源网关
    /// * `cache` - 查询缓存
    /// * `notifier` - 通知接收器
    /// * `fallback_error` - 传输错误的通用提示
    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        cache: QueryCache,
        notifier: Arc<dyn NotificationSink>,
        fallback_error: String,
    ) -> Self {
        Self {
            gateway,
            cache,
            notifier,
            fallback_error,
            registry: Arc::new(HashMap::new()),
        }
    }

    /// 注册可按名称执行的变更
    pub fn with_descriptors(mut self, descriptors: impl IntoIterator<Item = MutationDescriptor>) -> Self {
        let registry = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        self.registry = Arc::new(registry);
        self
    }

    /// 按名称查找已注册的变更
    pub fn descriptor(&self, name: &str) -> Option<&MutationDescriptor> {
        self.registry.get(name)
    }

    /// 执行变更
    ///
    /// 成功：按顺序应用所有失效目标，发送成功通知，返回输出。
    /// 失败：不做任何失效，发送失败通知，返回错误。不会自动重试。
    ///
    /// # 参数
    ///
    /// * `descriptor` - 变更描述
    /// * `input` - 变更输入（请求体，单资源操作包含 `id`）
    ///
    /// # 返回值
    ///
    /// 返回网关输出或错误
    #[instrument(
        skip(self, descriptor, input),
        level = "info",
        fields(mutation = %descriptor.name, invocation = %Uuid::new_v4())
    )]
    pub async fn execute(&self, descriptor: &MutationDescriptor, input: Value) -> Result<Value> {
        let result = self
            .gateway
            .call(&descriptor.resource, &descriptor.operation, &input)
            .await;

        match result {
            Ok(output) => {
                let mut invalidated = 0;
                for target in &descriptor.invalidates {
                    let pattern = target.resolve(&input);
                    let count = self.cache.invalidate(&pattern);
                    debug!("Mutation {} invalidated {} entries for {}", descriptor.name, count, pattern);
                    invalidated += count;
                }
                info!(
                    "Mutation {} succeeded, {} cache entries invalidated",
                    descriptor.name, invalidated
                );
                self.notifier
                    .notify(Notification::success(descriptor.success_text()));
                Ok(output)
            }
            Err(e) => {
                warn!("Mutation {} failed: {}", descriptor.name, e);
                let fallback = descriptor
                    .failure_message
                    .as_deref()
                    .unwrap_or(&self.fallback_error);
                self.notifier
                    .notify(Notification::error(e.user_message(fallback)));
                Err(e)
            }
        }
    }

    /// 按名称执行已注册的变更
    ///
    /// 名称未注册时直接返回错误，不调用网关也不发送通知
    pub async fn execute_named(&self, name: &str, input: Value) -> Result<Value> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| SyncError::UnknownMutation(name.to_string()))?;
        self.execute(descriptor, input).await
    }
}
