//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效表输出命令的实现。

use crate::catalog::Catalog;
use crate::cli::{load_config, EdgesArgs};
use anyhow::{Context, Result};
use serde_json::json;

pub async fn execute(args: &EdgesArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut catalog = Catalog::console().context("failed to build console catalog")?;
    catalog
        .apply_overrides(&config.invalidation.overrides)
        .context("failed to apply invalidation overrides")?;
    catalog.validate().context("invalidation map is invalid")?;

    let map = catalog.map();
    let edges: Vec<_> = map
        .edges()
        .filter(|(mutation, _)| match &args.namespace {
            Some(ns) => map.mutations_affecting(ns).contains(mutation),
            None => true,
        })
        .collect();

    if args.json {
        let rows: Vec<_> = edges
            .iter()
            .map(|(mutation, targets)| {
                json!({
                    "mutation": mutation,
                    "invalidates": targets.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("=== Invalidation Map ===\n");
    println!(
        "Namespaces: {}\n",
        map.namespaces().collect::<Vec<_>>().join(", ")
    );

    let width = edges.iter().map(|(m, _)| m.len()).max().unwrap_or(0);
    for (mutation, targets) in &edges {
        let rendered = if targets.is_empty() {
            "(none)".to_string()
        } else {
            targets
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("  {:<width$}  ->  {}", mutation, rendered, width = width);
    }

    println!("\n{} mutations", edges.len());
    Ok(())
}
