//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志和链路追踪的初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 默认日志过滤规则
pub const DEFAULT_FILTER: &str = "opscache=info";

/// 初始化 tracing
///
/// 组合 fmt 日志层、`EnvFilter` 和 OpenTelemetry 层。应在程序启动时调用一次，
/// 重复调用不会覆盖已有的全局 subscriber。
///
/// # 参数
///
/// * `service_name` - 服务名称，用作 tracer 名称
/// * `filter` - 过滤规则，为 None 时读取 `RUST_LOG`，再回退到 `DEFAULT_FILTER`
///
/// # 返回值
///
/// 成功安装全局 subscriber 时返回 true
pub fn init_tracing(service_name: &str, filter: Option<&str>) -> bool {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    // 未配置导出器时 provider 只负责生成 span 上下文
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// 关闭全局 tracer provider
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
