//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了会话：查询缓存、变更目录和变更执行器的显式所有者。
//! 会话开始时初始化，登出时调用 `teardown`。

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::gateway::{Operation, ResourceGateway};
use crate::key::CacheKey;
use crate::mutation::MutationExecutor;
use crate::notify::{NotificationSink, NullSink};
use crate::query::{QueryCache, QueryState};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// 会话
///
/// 每个会话拥有独立的缓存和指标，会话之间互不影响
pub struct Session {
    id: Uuid,
    config: Config,
    gateway: Arc<dyn ResourceGateway>,
    cache: QueryCache,
    catalog: Arc<Catalog>,
    executor: MutationExecutor,
}

impl Session {
    /// 使用控制台目录初始化会话
    ///
    /// # 参数
    ///
    /// * `config` - 配置
    /// * `gateway` - 资源网关
    /// * `notifier` - 通知接收器
    ///
    /// # 返回值
    ///
    /// 返回会话实例，配置或失效表验证失败时返回错误
    pub fn init(
        config: Config,
        gateway: Arc<dyn ResourceGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        Self::with_catalog(config, Catalog::console()?, gateway, notifier)
    }

    /// 使用指定目录初始化会话
    #[instrument(skip_all, level = "info")]
    pub fn with_catalog(
        config: Config,
        mut catalog: Catalog,
        gateway: Arc<dyn ResourceGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate().map_err(SyncError::Config)?;
        catalog.apply_overrides(&config.invalidation.overrides)?;
        catalog.validate()?;

        let notifier: Arc<dyn NotificationSink> = if config.notifications.enabled {
            notifier
        } else {
            Arc::new(NullSink)
        };
        let fallback = config.notifications.fallback_error.clone();

        let cache = QueryCache::with_fallback_error(&config.cache, notifier.clone(), fallback.clone());
        let executor = MutationExecutor::new(gateway.clone(), cache.clone(), notifier, fallback)
            .with_descriptors(catalog.descriptors().cloned());

        let id = Uuid::new_v4();
        info!(
            "Session {} initialized with {} mutations",
            id,
            catalog.descriptors().count()
        );

        Ok(Self {
            id,
            config,
            gateway,
            cache,
            catalog: Arc::new(catalog),
            executor,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn executor(&self) -> &MutationExecutor {
        &self.executor
    }

    /// 通过网关读取缓存键
    ///
    /// 键的参数原样作为网关参数
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `resource` - 网关资源名称
    /// * `operation` - 网关读取操作
    pub async fn read(&self, key: CacheKey, resource: &str, operation: Operation) -> QueryState {
        let gateway = self.gateway.clone();
        let resource = resource.to_string();
        let params = key.params_json();
        self.cache
            .read(key, move || {
                let gateway = gateway.clone();
                let resource = resource.clone();
                let operation = operation.clone();
                let params = params.clone();
                async move { gateway.call(&resource, &operation, &params).await }
            })
            .await
    }

    /// 读取资源列表，键为 `resource{params}`
    pub async fn list(&self, resource: &str, params: &Value) -> Result<QueryState> {
        let key = CacheKey::from_json(resource, params)?;
        Ok(self.read(key, resource, Operation::List).await)
    }

    /// 读取单个资源，键为 `namespace{id}`
    ///
    /// # 参数
    ///
    /// * `namespace` - 详情命名空间，例如 `ticket`
    /// * `resource` - 网关资源名称，例如 `tickets`
    /// * `id` - 资源ID
    pub async fn get(&self, namespace: &str, resource: &str, id: &str) -> QueryState {
        let key = CacheKey::new(namespace).with("id", id);
        self.read(key, resource, Operation::Get).await
    }

    /// 按名称执行变更
    pub async fn mutate(&self, name: &str, input: Value) -> Result<Value> {
        self.executor.execute_named(name, input).await
    }

    /// 会话状态摘要
    pub fn status(&self) -> Value {
        json!({
            "session": self.id.to_string(),
            "entries": self.cache.len(),
            "mutations": self.catalog.descriptors().count(),
            "namespaces": self.catalog.map().namespaces().collect::<Vec<_>>(),
        })
    }

    /// 结束会话
    ///
    /// 清空缓存，所有观察者收到 `Idle`
    #[instrument(skip(self), level = "info", fields(session = %self.id))]
    pub fn teardown(&self) {
        let entries = self.cache.len();
        self.cache.clear();
        info!("Session {} torn down, {} entries dropped", self.id, entries);
    }
}
