//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置检查命令的实现。

use crate::catalog::Catalog;
use crate::cli::CheckConfigArgs;
use crate::config::Config;
use anyhow::{Context, Result};

pub async fn execute(args: &CheckConfigArgs) -> Result<()> {
    let config = Config::load(&args.path)
        .with_context(|| format!("configuration {} is invalid", args.path.display()))?;

    let mut catalog = Catalog::console()?;
    catalog
        .apply_overrides(&config.invalidation.overrides)
        .context("invalidation overrides are invalid")?;
    catalog
        .validate()
        .context("invalidation overrides reference unknown namespaces")?;

    println!("✅ {} is valid", args.path.display());
    println!("  Gateway:       {}", config.gateway.base_url);
    println!("  Timeout:       {} ms", config.gateway.timeout_ms);
    println!(
        "  Auth token:    {}",
        if config.gateway.api_token.is_some() {
            "configured"
        } else {
            "none"
        }
    );
    match config.cache.stale_time_secs {
        Some(secs) => println!("  Stale after:   {}s", secs),
        None => println!("  Stale after:   never (until invalidated)"),
    }
    match config.cache.max_entries {
        0 => println!("  Max entries:   unbounded"),
        n => println!("  Max entries:   {}", n),
    }
    println!("  Notifications: {}", config.notifications.enabled);
    println!("  Overrides:     {}", config.invalidation.overrides.len());

    Ok(())
}
