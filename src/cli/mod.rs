//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "opscache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Log filter directives (defaults to RUST_LOG)")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "edges", about = "Print the validated invalidation table")]
    Edges(EdgesArgs),

    #[command(name = "check-config", about = "Validate a configuration file")]
    CheckConfig(CheckConfigArgs),

    #[command(name = "fetch", about = "Perform one cached read through the HTTP gateway")]
    Fetch(FetchArgs),
}

#[derive(Parser, Debug)]
pub struct EdgesArgs {
    #[arg(short, long, help = "Configuration file with invalidation overrides")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Only show mutations affecting this namespace")]
    pub namespace: Option<String>,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    #[arg(help = "Path to the TOML configuration file")]
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    #[arg(help = "Gateway resource, e.g. tickets")]
    pub resource: String,

    #[arg(long, help = "Fetch a single resource by id")]
    pub id: Option<String>,

    #[arg(long, help = "Cache namespace for single reads (defaults to the resource name)")]
    pub namespace: Option<String>,

    #[arg(short, long = "param", value_name = "KEY=VALUE", help = "Query parameter, repeatable")]
    pub params: Vec<String>,

    #[arg(short, long, help = "Configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Print cache metrics after the read")]
    pub metrics: bool,
}

mod check;
mod edges;
mod fetch;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing("opscache", cli.log.as_deref());

    let result = match &cli.command {
        Commands::Edges(args) => edges::execute(args).await,
        Commands::CheckConfig(args) => check::execute(args).await,
        Commands::Fetch(args) => fetch::execute(args).await,
    };

    crate::telemetry::shutdown_tracing();
    result
}

/// 加载配置，未指定路径时使用默认配置
fn load_config(path: Option<&std::path::Path>) -> Result<crate::config::Config> {
    use anyhow::Context;

    match path {
        Some(path) => crate::config::Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(crate::config::Config::default()),
    }
}
