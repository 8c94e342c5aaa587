mod backend;
mod config;
mod device;
mod error;
mod runner;

use tracing_subscriber::EnvFilter;
use crate::config::{AppConfig, RunMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;

    match config.mode {
        RunMode::Serve => backend::serve(config).await,
        RunMode::Once => tokio::task::spawn_blocking(move || runner::run_once(&config)).await?,
        RunMode::Logo => tokio::task::spawn_blocking(move || runner::run_logo(&config)).await?,
    }
}
