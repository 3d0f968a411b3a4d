//! App router server.
//!
//! Loads the configuration, builds the route tree and serves rendered pages
//! until Ctrl+C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use app_router::config::{load_config, RouterConfig};
use app_router::lifecycle::startup;
use app_router::observability::logging;
use app_router::render::StaticDataSource;

#[derive(Parser)]
#[command(name = "app-router")]
#[command(about = "Serve a file-system route tree", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "app-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        streaming = config.render.streaming,
        manifest = config.routes.manifest_path.as_deref().unwrap_or("<inline>"),
        "Configuration loaded"
    );

    startup::run(config, Arc::new(StaticDataSource::new())).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
