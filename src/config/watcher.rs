//! Route manifest watcher for hot reload.

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::loader::{load_manifest, ConfigError};
use crate::tree::{RouteTree, RouteTreeBuilder};

type Customize = Arc<dyn Fn(RouteTreeBuilder) -> RouteTreeBuilder + Send + Sync>;

/// Rebuilds the route tree when the manifest file changes.
///
/// The live tree is swapped atomically; requests already holding the old
/// tree finish against it.
pub struct ManifestWatcher {
    path: PathBuf,
    tree: Arc<ArcSwap<RouteTree>>,
    customize: Customize,
}

impl ManifestWatcher {
    pub fn new(path: &Path, tree: Arc<ArcSwap<RouteTree>>) -> Self {
        Self {
            path: path.to_path_buf(),
            tree,
            customize: Arc::new(|builder: RouteTreeBuilder| builder),
        }
    }

    /// Re-attach capabilities (renderers, data, metadata) on every rebuild.
    pub fn with_capabilities(
        mut self,
        customize: impl Fn(RouteTreeBuilder) -> RouteTreeBuilder + Send + Sync + 'static,
    ) -> Self {
        self.customize = Arc::new(customize);
        self
    }

    /// Rebuild from disk and swap the live tree. The old tree stays on failure.
    pub fn reload(&self) -> Result<(), ConfigError> {
        reload(&self.path, &self.tree, &self.customize)
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let tree = self.tree.clone();
        let customize = self.customize.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Route manifest change detected, rebuilding");
                        if let Err(e) = reload(&path, &tree, &customize) {
                            tracing::error!(error = %e, "Failed to rebuild route tree. Keeping current tree.");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Manifest watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, tree: &ArcSwap<RouteTree>, customize: &Customize) -> Result<(), ConfigError> {
    let manifest = load_manifest(path)?;
    let rebuilt = customize(manifest.builder()).build()?;
    tracing::info!(routes = rebuilt.routes().len(), "Route tree reloaded");
    tree.store(Arc::new(rebuilt));
    Ok(())
}
