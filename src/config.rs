//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了数据访问层的配置结构和解析逻辑。

use crate::error::{Result, SyncError, DEFAULT_FALLBACK_MESSAGE};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: QueryCacheConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub invalidation: InvalidationConfig,
}

/// 网关配置
///
/// 定义后端API的地址、超时和认证
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GatewayConfig {
    /// 后端API基础地址
    pub base_url: String,
    /// 请求超时时间（毫秒）
    pub timeout_ms: u64,
    /// 访问令牌（可选，使用 SecretString 保护）
    pub api_token: Option<SecretString>,
    /// User-Agent 请求头
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_ms: 15000,
            api_token: None,
            user_agent: format!("opscache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 查询缓存配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct QueryCacheConfig {
    /// 成功条目的新鲜期（秒），None表示在失效之前一直新鲜
    pub stale_time_secs: Option<u64>,
    /// 最大条目数，0表示不限制
    pub max_entries: usize,
}

/// 通知配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct NotificationConfig {
    /// 是否发送通知
    pub enabled: bool,
    /// 传输错误时展示的通用提示
    pub fallback_error: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_error: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// 失效表配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct InvalidationConfig {
    /// 为指定变更追加失效命名空间
    pub overrides: Vec<InvalidationOverride>,
}

/// 单个变更的失效覆盖项
#[derive(Deserialize, Clone, Debug)]
pub struct InvalidationOverride {
    /// 变更名称
    pub mutation: String,
    /// 追加的命名空间，内置目标始终保留
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl Config {
    /// 从TOML文件加载并验证配置
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 返回验证通过的配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// 从TOML字符串解析并验证配置
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate().map_err(SyncError::Config)?;
        Ok(config)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        // 验证配置版本
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        // 验证网关配置
        if self.gateway.base_url.trim().is_empty() {
            return Err("Gateway base_url cannot be empty".to_string());
        }

        if !self.gateway.base_url.starts_with("http://")
            && !self.gateway.base_url.starts_with("https://")
        {
            return Err(format!(
                "Gateway base_url '{}' must start with http:// or https://",
                self.gateway.base_url
            ));
        }

        if !(100..=60000).contains(&self.gateway.timeout_ms) {
            return Err("Gateway timeout_ms must be between 100 and 60000 ms".to_string());
        }

        // 验证缓存配置
        if let Some(stale) = self.cache.stale_time_secs {
            if stale == 0 {
                return Err("Cache stale_time_secs cannot be zero".to_string());
            }
            if stale > 86400 {
                return Err("Cache stale_time_secs cannot exceed 1 day (86400 seconds)".to_string());
            }
        }

        if self.cache.max_entries > 1_000_000 {
            return Err("Cache max_entries cannot exceed 1,000,000".to_string());
        }

        // 验证通知配置
        if self.notifications.fallback_error.trim().is_empty() {
            return Err("Notification fallback_error cannot be empty".to_string());
        }

        // 验证失效覆盖项
        for (i, item) in self.invalidation.overrides.iter().enumerate() {
            if item.mutation.trim().is_empty() {
                return Err(format!("Invalidation override #{} has an empty mutation name", i));
            }
            if self.invalidation.overrides[..i]
                .iter()
                .any(|prev| prev.mutation == item.mutation)
            {
                return Err(format!(
                    "Invalidation override for '{}' is declared more than once",
                    item.mutation
                ));
            }
        }

        Ok(())
    }
}
