//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于HTTP的资源网关实现。

use super::{Operation, ResourceGateway};
use crate::config::GatewayConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// HTTP资源网关
///
/// 操作到HTTP请求的映射：
/// - `List` → `GET {base}/{resource}?params`
/// - `Get` → `GET {base}/{resource}/{id}`
/// - `Create` → `POST {base}/{resource}`
/// - `Update` → `PATCH {base}/{resource}/{id}`
/// - `Delete` → `DELETE {base}/{resource}/{id}`
/// - `Action(a)` → `POST {base}/{resource}/{id}/{a}`，无ID时为 `POST {base}/{resource}/{a}`
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    api_token: Option<secrecy::SecretString>,
}

impl HttpGateway {
    /// 根据网关配置创建HTTP网关
    ///
    /// # 参数
    ///
    /// * `config` - 网关配置
    ///
    /// # 返回值
    ///
    /// 返回新的网关实例或配置错误
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        // 统一以斜杠结尾，endpoint 会去掉空的末段
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| SyncError::Config(format!("invalid gateway base_url: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    /// 拼接资源路径
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::Config("gateway base_url cannot be a base".to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// 构造请求
    fn build_request(
        &self,
        resource: &str,
        operation: &Operation,
        params: &Value,
    ) -> Result<RequestBuilder> {
        let id = resource_id(params);
        let require_id = || {
            id.clone().ok_or_else(|| {
                SyncError::InvalidRequest(format!(
                    "operation {} on {} requires an id parameter",
                    operation, resource
                ))
            })
        };

        let request = match operation {
            Operation::List => {
                let url = self.endpoint(&[resource])?;
                self.client
                    .request(Method::GET, url)
                    .query(&query_pairs(params))
            }
            Operation::Get => {
                let id = require_id()?;
                self.client
                    .request(Method::GET, self.endpoint(&[resource, id.as_str()])?)
            }
            Operation::Create => self
                .client
                .request(Method::POST, self.endpoint(&[resource])?)
                .json(params),
            Operation::Update => {
                let id = require_id()?;
                self.client
                    .request(Method::PATCH, self.endpoint(&[resource, id.as_str()])?)
                    .json(params)
            }
            Operation::Delete => {
                let id = require_id()?;
                self.client
                    .request(Method::DELETE, self.endpoint(&[resource, id.as_str()])?)
            }
            Operation::Action(action) => {
                let url = match &id {
                    Some(id) => self.endpoint(&[resource, id.as_str(), action.as_str()])?,
                    None => self.endpoint(&[resource, action.as_str()])?,
                };
                self.client.request(Method::POST, url).json(params)
            }
        };

        Ok(match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        })
    }
}

#[async_trait]
impl ResourceGateway for HttpGateway {
    #[instrument(skip(self, params), level = "debug", fields(resource = %resource, operation = %operation))]
    async fn call(&self, resource: &str, operation: &Operation, params: &Value) -> Result<Value> {
        let request = self.build_request(resource, operation, params)?;
        let response = request.send().await.map_err(|e| {
            warn!("Gateway request failed: {}", e);
            SyncError::Transport {
                status: None,
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!("Gateway response: status={}, body_len={}", status, body.len());

        if status.is_success() {
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&body)?);
        }

        Err(classify_failure(status, &body))
    }
}

/// 把非2xx响应归类为应用错误或传输错误
///
/// 响应体是带字符串 `message` 字段的JSON对象时为应用错误
pub(crate) fn classify_failure(status: StatusCode, body: &[u8]) -> SyncError {
    let structured = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .filter(|m| !m.trim().is_empty());

    match structured {
        Some(message) => SyncError::Application {
            status: status.as_u16(),
            message,
        },
        None => SyncError::Transport {
            status: Some(status.as_u16()),
            message: format!(
                "HTTP {}: {}",
                status,
                String::from_utf8_lossy(body).chars().take(200).collect::<String>()
            ),
        },
    }
}

/// 从参数中取资源ID（字符串或整数）
fn resource_id(params: &Value) -> Option<String> {
    match params.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 把列表过滤条件转换为查询参数，`null` 值省略
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k.clone(), s.clone())),
            other => Some((k.clone(), other.to_string())),
        })
        .collect()
}
