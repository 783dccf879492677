//! siteseal-edge - request-time verification daemon.
//!
//! Hosts the edge gate over a deployed site tree. Configuration is loaded
//! and validated once at startup; a config without usable trusted keys is
//! rejected before the listener binds.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use siteseal_core::config::EdgeConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// siteseal-edge - verified static site serving
#[derive(Parser, Debug)]
#[command(name = "siteseal-edge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the edge configuration file
    #[arg(short, long, default_value = "edge.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = EdgeConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load edge config {}", cli.config.display()))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(siteseal_edge::server::run(config))
}
