//! chunkup command-line entry point.

mod app;
mod args;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = args::Args::parse();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunkup");

    let mut config = match &args.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    if let Some(url) = &args.url {
        config.uploader.upload_url = url.clone();
    }
    tracing::info!(url = %config.uploader.upload_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, args.files))
}
