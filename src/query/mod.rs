//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了查询缓存：按缓存键保存最近一次读取结果，支持读取（缓存或请求）、
//! 强制刷新、精确键或命名空间失效，以及同键并发请求去重。

pub mod state;

pub use state::{QueryState, QueryStatus};

use crate::config::QueryCacheConfig;
use crate::error::{Result, SyncError, DEFAULT_FALLBACK_MESSAGE};
use crate::key::{CacheKey, KeyPattern};
use crate::metrics::{QueryEvent, QueryMetrics};
use crate::notify::{Notification, NotificationSink, NullSink};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

/// 请求函数
///
/// 每次调用执行一次网关读取
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// 可在多个读取者之间共享的进行中请求
type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

/// 单个键的槽位
///
/// `state` 负责向观察者广播状态转换，`control` 负责串行化结算
struct Slot {
    state: watch::Sender<QueryState>,
    control: Mutex<SlotControl>,
}

#[derive(Default)]
struct SlotControl {
    /// 每次发起请求或失效时递增；请求只有在代数未变时才能写入结果
    generation: u64,
    /// 进行中的请求及其代数
    in_flight: Option<(u64, SharedFetch)>,
    /// 最近一次读取登记的请求函数，供 `refetch` 使用
    fetcher: Option<Fetcher>,
}

impl Slot {
    fn new() -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            state,
            control: Mutex::new(SlotControl::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotControl> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> QueryState {
        self.state.borrow().clone()
    }
}

enum Pending {
    Ready(QueryState),
    Wait(SharedFetch),
}

struct Inner {
    slots: DashMap<CacheKey, Arc<Slot>>,
    stale_after: Option<Duration>,
    max_entries: usize,
    metrics: QueryMetrics,
    notifier: Arc<dyn NotificationSink>,
    fallback_error: String,
}

/// 查询缓存
///
/// 进程内共享的键值存储。克隆开销很小，所有克隆共享同一份数据。
/// 所有状态变化都必须通过 `read`、`refetch`、`invalidate` 和 `clear` 完成。
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// 创建新的查询缓存
    ///
    /// # 参数
    ///
    /// * `config` - 查询缓存配置
    /// * `notifier` - 请求失败时使用的通知接收器
    ///
    /// # 返回值
    ///
    /// 返回新的查询缓存实例
    pub fn new(config: &QueryCacheConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        Self::with_fallback_error(config, notifier, DEFAULT_FALLBACK_MESSAGE.to_string())
    }

    /// 创建查询缓存并指定传输错误的通用提示
    pub fn with_fallback_error(
        config: &QueryCacheConfig,
        notifier: Arc<dyn NotificationSink>,
        fallback_error: String,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                stale_after: config.stale_time_secs.map(Duration::from_secs),
                max_entries: config.max_entries,
                metrics: QueryMetrics::new(),
                notifier,
                fallback_error,
            }),
        }
    }

    /// 创建不限容量、不发送通知的查询缓存
    pub fn unbounded() -> Self {
        Self::new(&QueryCacheConfig::default(), Arc::new(NullSink))
    }

    /// 获取指标收集器
    pub fn metrics(&self) -> &QueryMetrics {
        &self.inner.metrics
    }

    /// 读取缓存条目
    ///
    /// 条目不存在或已失效时调用 `fetcher` 发起请求，并依次发布 `Loading` 与
    /// `Success`/`Error`。同一键已有请求进行中时不会发起第二次请求，而是等待
    /// 同一个请求的结果。失败条目不会自动重试，需调用 `refetch`。
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `fetcher` - 请求函数
    ///
    /// # 返回值
    ///
    /// 返回读取结束时的条目快照
    #[instrument(skip(self, fetcher), level = "debug", fields(key = %key))]
    pub async fn read<F, Fut>(&self, key: CacheKey, fetcher: F) -> QueryState
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || fetcher().boxed());
        let slot = self.slot(&key);

        let pending = {
            let mut control = slot.lock();
            control.fetcher = Some(fetcher.clone());

            if let Some((_, shared)) = &control.in_flight {
                debug!("Joining in-flight fetch for key: {}", key);
                self.inner.metrics.record(&key.resource, QueryEvent::Joined);
                Pending::Wait(shared.clone())
            } else {
                let current = slot.snapshot();
                if self.is_fresh(&current) {
                    debug!("Query cache hit for key: {}", key);
                    self.inner.metrics.record(&key.resource, QueryEvent::Hit);
                    Pending::Ready(current)
                } else {
                    debug!("Query cache miss for key: {}", key);
                    self.inner.metrics.record(&key.resource, QueryEvent::Miss);
                    Pending::Wait(self.start_fetch(&key, &slot, &mut control, fetcher))
                }
            }
        };

        match pending {
            Pending::Ready(state) => state,
            Pending::Wait(shared) => {
                let outcome = shared.await;
                Self::resolve(&slot, &outcome)
            }
        }
    }

    /// 读取并反序列化为指定类型
    ///
    /// 条目为错误状态时返回保存的错误
    pub async fn read_as<T, F, Fut>(&self, key: CacheKey, fetcher: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let value = self.read(key, fetcher).await.into_result()?;
        Ok(serde_json::from_value(value)?)
    }

    /// 强制刷新
    ///
    /// 即使已有新鲜的成功条目也重新请求，使用最近一次读取登记的请求函数。
    /// 新请求会取代任何更早的进行中请求。
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    ///
    /// # 返回值
    ///
    /// 返回刷新结束时的条目快照，键从未被读取过时返回错误
    #[instrument(skip(self), level = "debug", fields(key = %key))]
    pub async fn refetch(&self, key: &CacheKey) -> Result<QueryState> {
        let slot = self
            .inner
            .slots
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| SyncError::UnknownQuery(key.to_string()))?;

        let shared = {
            let mut control = slot.lock();
            let fetcher = control
                .fetcher
                .clone()
                .ok_or_else(|| SyncError::UnknownQuery(key.to_string()))?;
            self.start_fetch(key, &slot, &mut control, fetcher)
        };

        let outcome = shared.await;
        Ok(Self::resolve(&slot, &outcome))
    }

    /// 使匹配的条目失效
    ///
    /// 匹配的条目被重置为空的 `Idle` 状态，进行中的请求被取代，其结果不会写入缓存。
    /// 没有观察者的条目随后从缓存中移除。对不存在的键失效是空操作，不会创建条目。
    ///
    /// # 参数
    ///
    /// * `pattern` - 精确键或命名空间
    ///
    /// # 返回值
    ///
    /// 返回被失效的条目数量
    #[instrument(skip(self), level = "debug", fields(pattern = %pattern))]
    pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
        let slots: Vec<(CacheKey, Arc<Slot>)> = match pattern {
            KeyPattern::Exact(key) => self
                .inner
                .slots
                .get(key)
                .map(|r| vec![(r.key().clone(), r.value().clone())])
                .unwrap_or_default(),
            KeyPattern::Namespace(_) => self
                .inner
                .slots
                .iter()
                .filter(|r| pattern.matches(r.key()))
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
        };

        let mut count = 0;
        for (key, slot) in slots {
            if Self::reset(&slot) {
                debug!("Invalidated key: {}", key);
                self.inner
                    .metrics
                    .record(&key.resource, QueryEvent::Invalidated);
                count += 1;
            }
            self.release(&key, &slot);
        }
        count
    }

    /// 使单个键失效
    pub fn invalidate_key(&self, key: &CacheKey) -> usize {
        self.invalidate(&KeyPattern::Exact(key.clone()))
    }

    /// 使整个命名空间失效
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.invalidate(&KeyPattern::Namespace(namespace.to_string()))
    }

    /// 订阅某个键的状态变化
    ///
    /// 任意数量的观察者都会收到同样的状态转换
    pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<QueryState> {
        self.slot(key).state.subscribe()
    }

    /// 查看条目当前状态，不触发请求
    pub fn peek(&self, key: &CacheKey) -> Option<QueryState> {
        self.inner.slots.get(key).map(|r| r.value().snapshot())
    }

    /// 当前条目数量
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// 当前所有缓存键
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.inner.slots.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    /// 清空缓存
    ///
    /// 会话结束时调用。进行中的请求被取代，观察者收到 `Idle`。
    #[instrument(skip(self), level = "info")]
    pub fn clear(&self) {
        let slots: Vec<Arc<Slot>> = self.inner.slots.iter().map(|r| r.value().clone()).collect();
        for slot in &slots {
            Self::reset(slot);
        }
        self.inner.slots.clear();
        debug!("Query cache cleared, {} entries dropped", slots.len());
    }

    /// 获取或创建槽位
    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        if let Some(slot) = self.inner.slots.get(key) {
            return slot.value().clone();
        }
        self.inner
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .value()
            .clone()
    }

    /// 判断条目是否可以直接返回
    ///
    /// 成功条目在新鲜期内可直接返回；失败条目保持原样，重试由调用方决定
    fn is_fresh(&self, state: &QueryState) -> bool {
        match state.status {
            QueryStatus::Success => match (self.inner.stale_after, state.updated_at) {
                (Some(window), Some(updated_at)) => {
                    let age = Utc::now().signed_duration_since(updated_at);
                    age.to_std().map(|age| age < window).unwrap_or(true)
                }
                _ => true,
            },
            QueryStatus::Error => true,
            QueryStatus::Idle | QueryStatus::Loading => false,
        }
    }

    /// 发起请求
    ///
    /// 调用时必须持有槽位控制锁。请求在独立任务中执行，读取者全部离开后仍会完成结算。
    /// 请求函数发生 panic 时按传输错误结算。
    fn start_fetch(
        &self,
        key: &CacheKey,
        slot: &Arc<Slot>,
        control: &mut SlotControl,
        fetcher: Fetcher,
    ) -> SharedFetch {
        control.generation += 1;
        let generation = control.generation;
        slot.state.send_modify(QueryState::begin_loading);
        self.inner.metrics.record(&key.resource, QueryEvent::Fetch);

        let cache = self.clone();
        let task_slot = slot.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(async { fetcher().await })
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(SyncError::Transport {
                    status: None,
                    message: "fetch panicked".to_string(),
                }),
            };
            cache.settle(&task_key, &task_slot, generation, &outcome);
            outcome
        });

        let shared = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(SyncError::Transport {
                    status: None,
                    message: format!("fetch task failed: {}", e),
                }),
            }
        }
        .boxed()
        .shared();

        control.in_flight = Some((generation, shared.clone()));
        shared
    }

    /// 结算请求结果
    ///
    /// 只有代数未变的请求才能写入条目，更早的请求不能覆盖更新的失效或刷新
    fn settle(&self, key: &CacheKey, slot: &Slot, generation: u64, outcome: &Result<Value>) {
        let applied = {
            let mut control = slot.lock();
            if control.generation == generation {
                control.in_flight = None;
                slot.state.send_modify(|state| state.settle(outcome));
                true
            } else {
                false
            }
        };

        if applied {
            debug!("Settled key {} at generation {}", key, generation);
        } else {
            debug!(
                "Discarding superseded result for key {} (generation {})",
                key, generation
            );
            self.inner
                .metrics
                .record(&key.resource, QueryEvent::Superseded);
        }

        if let Err(e) = outcome {
            warn!("Fetch failed for key {}: {}", key, e);
            self.inner
                .metrics
                .record(&key.resource, QueryEvent::FetchError);
            self.inner
                .notifier
                .notify(Notification::error(e.user_message(&self.inner.fallback_error)));
        }

        if applied {
            self.enforce_capacity(key);
        }
    }

    /// 构造返回给读取者的快照
    ///
    /// 槽位已结算时返回槽位的最新状态；否则（被失效或被更新的请求取代）
    /// 返回由本次结果构造的独立快照
    fn resolve(slot: &Slot, outcome: &Result<Value>) -> QueryState {
        let current = slot.snapshot();
        if current.is_settled() {
            current
        } else {
            QueryState::from_outcome(outcome)
        }
    }

    /// 把槽位重置为空状态
    ///
    /// # 返回值
    ///
    /// 槽位原本有数据或有请求进行中时返回 true
    fn reset(slot: &Slot) -> bool {
        let mut control = slot.lock();
        let had_data = control.in_flight.is_some() || slot.state.borrow().status != QueryStatus::Idle;
        control.generation += 1;
        control.in_flight = None;
        if had_data {
            slot.state.send_replace(QueryState::default());
        }
        had_data
    }

    /// 移除已重置且无人使用的槽位
    ///
    /// 槽位仍有观察者或已有新请求登记时保留
    fn release(&self, key: &CacheKey, slot: &Arc<Slot>) {
        let removed = self.inner.slots.remove_if(key, |_, current| {
            if !Arc::ptr_eq(current, slot) || current.state.receiver_count() > 0 {
                return false;
            }
            let control = current.lock();
            control.in_flight.is_none() && current.state.borrow().status == QueryStatus::Idle
        });
        if removed.is_some() {
            debug!("Released key: {}", key);
        }
    }

    /// 超出容量时淘汰最久未结算且无观察者的条目
    ///
    /// 从未结算过的槽位可能刚由读取创建，不参与淘汰
    fn enforce_capacity(&self, protected: &CacheKey) {
        let max = self.inner.max_entries;
        if max == 0 {
            return;
        }

        while self.inner.slots.len() > max {
            let victim = self
                .inner
                .slots
                .iter()
                .filter(|r| r.key() != protected)
                .filter(|r| r.value().state.receiver_count() == 0)
                .filter(|r| r.value().lock().in_flight.is_none())
                .filter_map(|r| {
                    let updated_at = r.value().state.borrow().updated_at?;
                    Some((updated_at, r.key().clone()))
                })
                .min_by_key(|(updated_at, _)| *updated_at)
                .map(|(_, key)| key);

            match victim {
                Some(key) => {
                    self.inner.slots.remove(&key);
                    debug!("Evicted key {} (capacity {})", key, max);
                    self.inner.metrics.record(&key.resource, QueryEvent::Evicted);
                }
                None => break,
            }
        }
    }
}
