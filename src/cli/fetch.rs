//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了单次读取命令的实现。

use crate::cli::{load_config, FetchArgs};
use crate::gateway::http::HttpGateway;
use crate::notify::TracingSink;
use crate::query::QueryStatus;
use crate::session::Session;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

pub async fn execute(args: &FetchArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let gateway = HttpGateway::new(&config.gateway).context("failed to create HTTP gateway")?;
    let session = Session::init(config, Arc::new(gateway), Arc::new(TracingSink))
        .context("failed to initialize session")?;

    let state = match &args.id {
        Some(id) => {
            if !args.params.is_empty() {
                bail!("--param cannot be combined with --id");
            }
            let namespace = args.namespace.as_deref().unwrap_or(&args.resource);
            session.get(namespace, &args.resource, id).await
        }
        None => {
            let params = parse_params(&args.params)?;
            session.list(&args.resource, &params).await?
        }
    };

    if args.metrics {
        eprint!("{}", session.cache().metrics().render());
    }
    session.teardown();

    match state.status {
        QueryStatus::Success => {
            let data = state.data.unwrap_or(Value::Null);
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        _ => match state.error {
            Some(e) => Err(anyhow!(e).context(format!("read of {} failed", args.resource))),
            None => bail!("read of {} did not settle", args.resource),
        },
    }
}

/// 解析 `key=value` 参数
///
/// `true`/`false`/`null` 和整数按类型解析，其余为字符串
fn parse_params(raw: &[String]) -> Result<Value> {
    let mut params = Map::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("parameter '{}' is not KEY=VALUE", item))?;
        if key.is_empty() {
            bail!("parameter '{}' has an empty key", item);
        }
        let value = match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            other => other
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(other.to_string())),
        };
        params.insert(key.to_string(), value);
    }
    Ok(Value::Object(params))
}
