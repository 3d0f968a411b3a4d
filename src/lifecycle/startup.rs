//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the initial route tree from configuration
//! - Start background tasks (manifest watcher, metrics, signals)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{manifest_for, ConfigError, ManifestWatcher, RouterConfig};
use crate::http::AppServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::render::DataSource;
use crate::tree::RouteTree;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to watch route manifest: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the route tree named by the routes section.
pub fn initial_tree(config: &RouterConfig) -> Result<RouteTree, ConfigError> {
    let tree = manifest_for(&config.routes)?.build()?;
    tracing::info!(routes = tree.routes().len(), nodes = tree.len(), "Route tree ready");
    Ok(tree)
}

/// Run the server until Ctrl+C.
pub async fn run(config: RouterConfig, source: Arc<dyn DataSource>) -> Result<(), StartupError> {
    let tree = Arc::new(ArcSwap::from_pointee(initial_tree(&config)?));

    // Dropping the watcher stops it; keep it for the server's lifetime.
    let _watcher = match (&config.routes.manifest_path, config.routes.watch) {
        (Some(path), true) => Some(ManifestWatcher::new(Path::new(path), tree.clone()).run()?),
        _ => None,
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_ctrl_c(shutdown.clone()));

    AppServer::new(config, tree, source).run(listener, &shutdown).await?;
    Ok(())
}
