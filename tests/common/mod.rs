//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

use async_trait::async_trait;
use opscache::{
    Config, Notification, NotificationSink, Operation, ResourceGateway, Result, Session,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

type Handler = dyn Fn(&str, &Operation, &Value) -> Result<Value> + Send + Sync;

/// 脚本化网关
///
/// 按处理函数返回结果，记录每次调用，可选地在返回前等待一段时间
#[allow(dead_code)]
pub struct ScriptedGateway {
    handler: Box<Handler>,
    delay: Option<Duration>,
    read_gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(String, Operation, Value)>>,
    count: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedGateway {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Operation, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            read_gate: None,
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// 对所有调用返回同一个值
    pub fn returning(value: Value) -> Self {
        Self::new(move |_, _, _| Ok(value.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 读取操作在返回前必须从信号量取得一个许可，写操作不受影响
    pub fn with_read_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.read_gate = Some(gate);
        self
    }

    /// 总调用次数
    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// 对某个资源的调用次数
    pub fn calls_to(&self, resource: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _, _)| r == resource)
            .count()
    }

    /// 所有调用记录
    pub fn calls(&self) -> Vec<(String, Operation, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceGateway for ScriptedGateway {
    async fn call(&self, resource: &str, operation: &Operation, params: &Value) -> Result<Value> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((resource.to_string(), operation.clone(), params.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let (Some(gate), true) = (&self.read_gate, operation.is_read()) {
            gate.acquire().await.expect("gate closed").forget();
        }
        (self.handler)(resource, operation, params)
    }
}

/// 记录所有通知的接收器
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|n| n.message)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// 创建使用控制台目录的会话
#[allow(dead_code)]
pub fn console_session(gateway: Arc<ScriptedGateway>) -> (Session, Arc<RecordingSink>) {
    setup_logging();
    let sink = RecordingSink::new();
    let session = Session::init(Config::default(), gateway, sink.clone())
        .expect("console session should initialize");
    (session, sink)
}
