//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了查询缓存的指标收集功能。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{span, Level};

/// 指标事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueryEvent {
    /// 命中新鲜的成功条目
    Hit,
    /// 未命中，需要发起请求
    Miss,
    /// 加入正在进行的请求（去重）
    Joined,
    /// 发起网关请求
    Fetch,
    /// 请求失败
    FetchError,
    /// 条目被失效
    Invalidated,
    /// 过期的结果被丢弃
    Superseded,
    /// 因容量限制被淘汰
    Evicted,
}

impl QueryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryEvent::Hit => "hit",
            QueryEvent::Miss => "miss",
            QueryEvent::Joined => "joined",
            QueryEvent::Fetch => "fetch",
            QueryEvent::FetchError => "fetch_error",
            QueryEvent::Invalidated => "invalidated",
            QueryEvent::Superseded => "superseded",
            QueryEvent::Evicted => "evicted",
        }
    }
}

/// 查询缓存指标收集器
///
/// 每个缓存实例持有一份，按 (命名空间, 事件) 计数
#[derive(Clone, Debug, Default)]
pub struct QueryMetrics {
    counters: Arc<Mutex<BTreeMap<(String, QueryEvent), u64>>>,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, QueryEvent), u64>> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 记录一次事件
    ///
    /// # 参数
    ///
    /// * `namespace` - 资源命名空间
    /// * `event` - 事件类型
    pub fn record(&self, namespace: &str, event: QueryEvent) {
        let span = span!(Level::TRACE, "query_metric", namespace, event = event.as_str());
        let _enter = span.enter();
        *self.lock().entry((namespace.to_string(), event)).or_insert(0) += 1;
    }

    /// 获取某命名空间下某事件的计数
    pub fn get(&self, namespace: &str, event: QueryEvent) -> u64 {
        self.lock()
            .get(&(namespace.to_string(), event))
            .copied()
            .unwrap_or(0)
    }

    /// 获取所有命名空间下某事件的总数
    pub fn total(&self, event: QueryEvent) -> u64 {
        self.lock()
            .iter()
            .filter(|((_, e), _)| *e == event)
            .map(|(_, v)| *v)
            .sum()
    }

    /// 清空所有计数
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// 以文本格式输出指标，用于监控系统采集
    pub fn render(&self) -> String {
        let mut output = String::new();
        for ((namespace, event), value) in self.lock().iter() {
            output.push_str(&format!(
                "query_cache_events_total{{namespace=\"{}\", event=\"{}\"}} {}\n",
                namespace,
                event.as_str(),
                value
            ));
        }
        output
    }
}
