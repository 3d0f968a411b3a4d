//! Client-side navigation.
//!
//! # Responsibilities
//! - Turn in-app navigation intents into resolve + render passes
//! - Commit the result: mount diff, history update, scroll bookkeeping
//! - Serve back/forward from cached snapshots while they are fresh
//! - Soft refresh of the mounted chain
//! - Background prefetch of link targets
//!
//! # Data Flow
//! ```text
//! navigate(href) | refresh() | back()/forward()
//!     → generation += 1, abort the previous in-flight operation
//!     → prefetch hit | RenderPipeline::render_reusing (follows redirects)
//!     → lock history
//!     → generation still current? commit : Superseded
//! ```
//!
//! # Design Decisions
//! - Every navigation gets a new sequence number; templates are keyed by
//!   it, so they remount on each navigation while layouts are kept
//! - Rendering happens outside the history lock; the generation check at
//!   commit time, under the lock, keeps late results out
//! - Each render uses its own request cache; it is seeded with the settled
//!   data of the chain levels shared with the current entry, so prefix data
//!   is never fetched twice. Nothing else is shared between navigations
//!   except the prefetch store

use futures_util::future::{AbortHandle, AbortRegistration, Abortable};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::NavigationConfig;
use crate::navigation::history::{HistoryStack, NavigationEntry, ScrollPosition};
use crate::navigation::mount::{MountDiff, MountHooks, MountedTree, NoopHooks};
use crate::navigation::prefetch::{PrefetchCache, PrefetchEntry};
use crate::observability::metrics;
use crate::render::{InstanceKey, LevelData, RenderError, RenderPayload, RenderPipeline, RenderStatus};
use crate::resolve::{MatchChain, RequestPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    Push,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavigationError {
    #[error("invalid navigation target: {0}")]
    InvalidUrl(String),

    /// The target is outside the app; the caller should load it as a document.
    #[error("{0} requires a full document navigation")]
    HardNavigation(String),

    #[error("no history entry in that direction")]
    NoHistory,

    #[error("too many redirects starting at {url} (limit {limit})")]
    RedirectLoop { url: String, limit: usize },

    #[error("render failed: {0}")]
    Failed(RenderError),
}

/// A committed navigation.
#[derive(Debug, Clone)]
pub struct Committed {
    /// Final URL, after redirects.
    pub url: String,
    pub status: RenderStatus,
    pub diff: MountDiff,
    /// Number of chain levels shared with the previously mounted chain.
    pub shared_prefix: usize,
    pub redirected: bool,
    /// Where the view should scroll to.
    pub scroll: ScrollPosition,
}

#[derive(Debug, Clone)]
pub enum NavigationResult {
    Committed(Committed),
    /// A newer navigation started before this one committed.
    Superseded,
}

impl NavigationResult {
    pub fn committed(&self) -> Option<&Committed> {
        match self {
            NavigationResult::Committed(c) => Some(c),
            NavigationResult::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, NavigationResult::Superseded)
    }
}

struct RouterState {
    history: HistoryStack,
    mounted: MountedTree,
    /// Live scroll offset of the current entry.
    scroll: ScrollPosition,
}

struct Loaded {
    url: String,
    chain: MatchChain,
    payload: RenderPayload,
    redirected: bool,
}

struct RouterInner {
    pipeline: RenderPipeline,
    config: NavigationConfig,
    hooks: Arc<dyn MountHooks>,
    generation: AtomicU64,
    state: tokio::sync::Mutex<RouterState>,
    prefetch: PrefetchCache,
    in_flight: Mutex<Option<AbortHandle>>,
}

/// Client navigation router. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ClientRouter {
    inner: Arc<RouterInner>,
}

impl ClientRouter {
    pub fn new(pipeline: RenderPipeline, config: NavigationConfig) -> Self {
        Self::with_hooks(pipeline, config, Arc::new(NoopHooks))
    }

    pub fn with_hooks(pipeline: RenderPipeline, config: NavigationConfig, hooks: Arc<dyn MountHooks>) -> Self {
        let prefetch = PrefetchCache::new(
            config.prefetch_concurrency,
            config.prefetch_capacity,
            Duration::from_secs(config.prefetch_stale_secs),
        );
        let state = RouterState {
            history: HistoryStack::new(config.history_capacity),
            mounted: MountedTree::new(),
            scroll: ScrollPosition::default(),
        };
        Self {
            inner: Arc::new(RouterInner {
                pipeline,
                config,
                hooks,
                generation: AtomicU64::new(0),
                state: tokio::sync::Mutex::new(state),
                prefetch,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Navigate to an in-app `href`, superseding any in-flight navigation.
    pub async fn navigate(&self, href: &str, mode: NavigationMode) -> Result<NavigationResult, NavigationError> {
        let path = parse_href(href)?;
        let (generation, registration) = self.inner.begin();

        let loaded = match Abortable::new(self.inner.load(path, generation), registration).await {
            Ok(loaded) => loaded,
            Err(_) => return Ok(self.inner.superseded(href)),
        };
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                metrics::record_navigation("failed");
                return Err(e);
            }
        };
        if let RenderStatus::Failed(err) = &loaded.payload.status {
            tracing::warn!(url = %loaded.url, error = %err, "Navigation render failed");
            metrics::record_navigation("failed");
            return Err(NavigationError::Failed(err.clone()));
        }

        let mut state = self.inner.state.lock().await;
        if !self.inner.is_current(generation) {
            return Ok(self.inner.superseded(href));
        }

        let shared_prefix = state
            .history
            .current()
            .map(|current| current.chain.common_prefix(&loaded.chain))
            .unwrap_or(0);
        let diff = self.inner.mount(&mut state, &loaded.payload);

        let left = state.scroll;
        if let Some(current) = state.history.current_mut() {
            current.scroll_position = left;
        }
        state.scroll = ScrollPosition::default();

        let entry = NavigationEntry {
            url: loaded.url.clone(),
            chain: loaded.chain,
            payload: loaded.payload,
            scroll_position: ScrollPosition::default(),
            timestamp: Instant::now(),
            navigation: generation,
        };
        let status = entry.payload.status.clone();
        match mode {
            NavigationMode::Push => state.history.push(entry),
            NavigationMode::Replace => state.history.replace(entry),
        }

        tracing::info!(
            url = %loaded.url,
            navigation = generation,
            mode = ?mode,
            status = status.label(),
            kept = diff.kept.len(),
            mounted = diff.mounted.len(),
            unmounted = diff.unmounted.len(),
            "Navigation committed"
        );
        metrics::record_navigation("committed");

        Ok(NavigationResult::Committed(Committed {
            url: loaded.url,
            status,
            diff,
            shared_prefix,
            redirected: loaded.redirected,
            scroll: ScrollPosition::default(),
        }))
    }

    pub async fn back(&self) -> Result<NavigationResult, NavigationError> {
        self.traverse(-1).await
    }

    pub async fn forward(&self) -> Result<NavigationResult, NavigationError> {
        self.traverse(1).await
    }

    async fn traverse(&self, delta: isize) -> Result<NavigationResult, NavigationError> {
        let (generation, registration) = self.inner.begin();
        let stale_after = Duration::from_secs(self.inner.config.snapshot_stale_secs);

        let (url, snapshot) = {
            let state = self.inner.state.lock().await;
            let entry = state.history.peek(delta).ok_or(NavigationError::NoHistory)?;
            let snapshot = (entry.timestamp.elapsed() <= stale_after)
                .then(|| (entry.chain.clone(), entry.payload.clone(), entry.timestamp));
            (entry.url.clone(), snapshot)
        };

        let (chain, mut payload, timestamp) = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                tracing::debug!(url = %url, "Snapshot stale, re-rendering");
                let target = self.inner.pipeline.resolve(&RequestPath::parse(&url));
                let chain = target.chain().clone();
                let reused = self.inner.reusable(&chain).await;
                let render = self.inner.pipeline.render_reusing(target, generation, &reused);
                match Abortable::new(render, registration).await {
                    Ok(payload) => (chain, payload, Instant::now()),
                    Err(_) => return Ok(self.inner.superseded(&url)),
                }
            }
        };
        if let RenderStatus::Failed(err) = &payload.status {
            metrics::record_navigation("failed");
            return Err(NavigationError::Failed(err.clone()));
        }
        if let Some(body) = payload.body.as_mut() {
            body.restamp_templates(generation);
        }

        let mut state = self.inner.state.lock().await;
        if !self.inner.is_current(generation) {
            return Ok(self.inner.superseded(&url));
        }

        let shared_prefix = state
            .history
            .current()
            .map(|current| current.chain.common_prefix(&chain))
            .unwrap_or(0);
        let left = state.scroll;
        if let Some(current) = state.history.current_mut() {
            current.scroll_position = left;
        }
        let diff = self.inner.mount(&mut state, &payload);
        let Some(entry) = state.history.go(delta) else {
            return Err(NavigationError::NoHistory);
        };
        entry.chain = chain;
        entry.payload = payload;
        entry.timestamp = timestamp;
        entry.navigation = generation;
        let scroll = entry.scroll_position;
        let status = entry.payload.status.clone();
        state.scroll = scroll;

        tracing::info!(url = %url, delta, navigation = generation, "History traversal committed");
        metrics::record_navigation("traversed");

        Ok(NavigationResult::Committed(Committed {
            url,
            status,
            diff,
            shared_prefix,
            redirected: false,
            scroll,
        }))
    }

    /// Re-run data and metadata for the mounted chain. Mounted instances and
    /// their local state are kept.
    ///
    /// Aborts an in-flight navigation and is superseded by any operation
    /// that starts after it. Commits only onto the entry it started from.
    pub async fn refresh(&self) -> Result<NavigationResult, NavigationError> {
        let (url, navigation) = {
            let state = self.inner.state.lock().await;
            let current = state.history.current().ok_or(NavigationError::NoHistory)?;
            (current.url.clone(), current.navigation)
        };
        let (generation, registration) = self.inner.begin();
        self.inner.prefetch.invalidate();

        let target = self.inner.pipeline.resolve(&RequestPath::parse(&url));
        let chain = target.chain().clone();
        let payload = match Abortable::new(self.inner.pipeline.render(target, navigation), registration).await {
            Ok(payload) => payload,
            Err(_) => return Ok(self.inner.superseded(&url)),
        };
        if let RenderStatus::Failed(err) = &payload.status {
            metrics::record_navigation("failed");
            return Err(NavigationError::Failed(err.clone()));
        }

        let mut state = self.inner.state.lock().await;
        let same_entry = state
            .history
            .current()
            .is_some_and(|current| current.url == url && current.navigation == navigation);
        if !self.inner.is_current(generation) || !same_entry {
            return Ok(self.inner.superseded(&url));
        }
        let diff = self.inner.mount(&mut state, &payload);
        let scroll = state.scroll;
        let status = payload.status.clone();
        let Some(current) = state.history.current_mut() else {
            return Err(NavigationError::NoHistory);
        };
        let shared_prefix = current.chain.common_prefix(&chain);
        current.chain = chain;
        current.payload = payload;
        current.timestamp = Instant::now();

        tracing::info!(url = %url, navigation, unmounted = diff.unmounted.len(), "Refresh committed");
        metrics::record_navigation("refreshed");

        Ok(NavigationResult::Committed(Committed {
            url,
            status,
            diff,
            shared_prefix,
            redirected: false,
            scroll,
        }))
    }

    /// Render `href` in the background into the prefetch store.
    ///
    /// Returns `None` when the target is external, invalid or already
    /// prefetched.
    pub fn prefetch(&self, href: &str) -> Option<JoinHandle<()>> {
        let path = parse_href(href).ok()?;
        let key = path.cache_key();
        if self.inner.prefetch.contains(&key) {
            return None;
        }

        let inner = self.inner.clone();
        let permits = inner.prefetch.permits();
        let epoch = inner.prefetch.epoch();
        Some(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let target = inner.pipeline.resolve(&path);
            let chain = target.chain().clone();
            let payload = inner.pipeline.render(target, 0).await;
            if let RenderStatus::Failed(err) = &payload.status {
                tracing::debug!(key = %key, error = %err, "Prefetch failed");
                metrics::record_prefetch("failed");
                return;
            }
            if inner.prefetch.insert(key.clone(), PrefetchEntry::new(chain, payload), epoch) {
                tracing::debug!(key = %key, "Prefetch stored");
            }
        }))
    }

    /// A link to `href` became visible.
    pub fn link_visible(&self, href: &str) -> Option<JoinHandle<()>> {
        if self.inner.config.auto_prefetch {
            self.prefetch(href)
        } else {
            None
        }
    }

    /// Record the live scroll offset of the current entry.
    pub async fn set_scroll_position(&self, position: ScrollPosition) {
        self.inner.state.lock().await.scroll = position;
    }

    /// Set local state of a mounted instance; false if it is not mounted.
    pub async fn set_local_state(&self, key: &InstanceKey, value: Value) -> bool {
        self.inner.state.lock().await.mounted.set_state(key, value)
    }

    pub async fn local_state(&self, key: &InstanceKey) -> Option<Value> {
        self.inner.state.lock().await.mounted.state(key).cloned()
    }

    pub async fn mounted(&self) -> Vec<InstanceKey> {
        self.inner.state.lock().await.mounted.keys()
    }

    pub async fn current_url(&self) -> Option<String> {
        let state = self.inner.state.lock().await;
        state.history.current().map(|e| e.url.clone())
    }

    pub async fn current_payload(&self) -> Option<RenderPayload> {
        let state = self.inner.state.lock().await;
        state.history.current().map(|e| e.payload.clone())
    }

    pub async fn history(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state.history.urls().into_iter().map(str::to_string).collect()
    }

    pub fn prefetched(&self, href: &str) -> bool {
        parse_href(href).is_ok_and(|path| self.inner.prefetch.contains(&path.cache_key()))
    }
}

impl RouterInner {
    /// Start a new navigation generation, aborting the in-flight operation.
    /// The registration makes the new operation abortable in turn.
    fn begin(&self) -> (u64, AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(previous) = in_flight.replace(handle) {
            previous.abort();
        }
        (generation, registration)
    }

    /// Settled data of the current entry's levels that `chain` shares.
    async fn reusable(&self, chain: &MatchChain) -> Vec<LevelData> {
        let state = self.state.lock().await;
        match state.history.current() {
            Some(current) => {
                let shared = current.chain.common_prefix(chain);
                current.payload.data.iter().take(shared).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn superseded(&self, href: &str) -> NavigationResult {
        tracing::debug!(href = %href, "Navigation superseded");
        metrics::record_navigation("superseded");
        NavigationResult::Superseded
    }

    fn mount(&self, state: &mut RouterState, payload: &RenderPayload) -> MountDiff {
        match &payload.body {
            Some(body) => state.mounted.apply(body, self.hooks.as_ref()),
            None => MountDiff::default(),
        }
    }

    /// Resolve and render `path`, following redirects.
    async fn load(&self, mut path: RequestPath, generation: u64) -> Result<Loaded, NavigationError> {
        let start = path.cache_key();
        let limit = self.config.max_redirects;
        for hop in 0..=limit {
            let url = path.cache_key();
            let (chain, mut payload) = match self.prefetch.get(&url) {
                Some(hit) => {
                    tracing::debug!(url = %url, "Using prefetched payload");
                    (hit.chain, hit.payload)
                }
                None => {
                    let target = self.pipeline.resolve(&path);
                    let chain = target.chain().clone();
                    let reused = self.reusable(&chain).await;
                    (chain, self.pipeline.render_reusing(target, generation, &reused).await)
                }
            };

            if let RenderStatus::Redirect(signal) = &payload.status {
                tracing::debug!(from = %url, to = %signal.location, hop, "Following redirect");
                path = parse_href(&signal.location)?;
                continue;
            }
            if let Some(body) = payload.body.as_mut() {
                body.restamp_templates(generation);
            }
            return Ok(Loaded {
                url,
                chain,
                payload,
                redirected: hop > 0,
            });
        }
        Err(NavigationError::RedirectLoop { url: start, limit })
    }
}

/// In-app targets are absolute paths; anything with a scheme leaves the app.
fn parse_href(href: &str) -> Result<RequestPath, NavigationError> {
    if href.starts_with('/') && !href.starts_with("//") {
        return Ok(RequestPath::parse(href));
    }
    match url::Url::parse(href) {
        Ok(_) => Err(NavigationError::HardNavigation(href.to_string())),
        Err(_) if href.starts_with("//") => Err(NavigationError::HardNavigation(href.to_string())),
        Err(_) => Err(NavigationError::InvalidUrl(href.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Outcome, RedirectSignal, SlotContext, StaticDataSource, View};
    use crate::tree::{RouteTreeBuilder, SlotKind};

    fn router() -> ClientRouter {
        let tree = RouteTreeBuilder::new()
            .slots("", &[SlotKind::Layout, SlotKind::Page])
            .slots("shop", &[SlotKind::Template, SlotKind::Page])
            .slot("shop/[item]", SlotKind::Page)
            .render("old", SlotKind::Page, |_: &SlotContext<'_>, _: View| {
                Outcome::Redirect(RedirectSignal::permanent("/shop"))
            })
            .render("loop", SlotKind::Page, |_: &SlotContext<'_>, _: View| {
                Outcome::Redirect(RedirectSignal::temporary("/loop"))
            })
            .build()
            .unwrap();
        let pipeline = RenderPipeline::new(Arc::new(tree), Arc::new(StaticDataSource::new()));
        ClientRouter::new(pipeline, NavigationConfig::default())
    }

    #[test]
    fn test_parse_href() {
        assert!(parse_href("/shop?x=1").is_ok());
        assert!(matches!(parse_href("https://example.com/"), Err(NavigationError::HardNavigation(_))));
        assert!(matches!(parse_href("//example.com/"), Err(NavigationError::HardNavigation(_))));
        assert!(matches!(parse_href("shop"), Err(NavigationError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_layout_kept_template_remounted() {
        let router = router();
        router.navigate("/shop/a", NavigationMode::Push).await.unwrap();
        let result = router.navigate("/shop/b", NavigationMode::Push).await.unwrap();
        let committed = result.committed().unwrap();

        assert!(committed.diff.kept.iter().any(|k| k.slot == SlotKind::Layout));
        assert!(committed.diff.mounted.iter().any(|k| k.slot == SlotKind::Template));
        assert!(committed.diff.unmounted.iter().any(|k| k.slot == SlotKind::Template));
        assert_eq!(committed.shared_prefix, 2);
    }

    #[tokio::test]
    async fn test_redirect_is_followed() {
        let router = router();
        let result = router.navigate("/old", NavigationMode::Push).await.unwrap();
        let committed = result.committed().unwrap();
        assert!(committed.redirected);
        assert_eq!(committed.url, "/shop");
        assert_eq!(router.history().await, vec!["/shop"]);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let router = router();
        let err = router.navigate("/loop", NavigationMode::Push).await.unwrap_err();
        assert!(matches!(err, NavigationError::RedirectLoop { limit: 5, .. }));
        assert!(router.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_mode() {
        let router = router();
        router.navigate("/", NavigationMode::Push).await.unwrap();
        router.navigate("/shop", NavigationMode::Replace).await.unwrap();
        assert_eq!(router.history().await, vec!["/shop"]);
        assert!(matches!(router.back().await, Err(NavigationError::NoHistory)));
    }

    #[tokio::test]
    async fn test_back_restores_scroll() {
        let router = router();
        router.navigate("/", NavigationMode::Push).await.unwrap();
        router.set_scroll_position(ScrollPosition::new(0, 480)).await;
        router.navigate("/shop", NavigationMode::Push).await.unwrap();

        let back = router.back().await.unwrap();
        let committed = back.committed().unwrap();
        assert_eq!(committed.url, "/");
        assert_eq!(committed.scroll, ScrollPosition::new(0, 480));

        let forward = router.forward().await.unwrap();
        assert_eq!(forward.committed().unwrap().url, "/shop");
    }

    #[tokio::test]
    async fn test_begin_aborts_previous_operation() {
        let router = router();
        let (first, registration) = router.inner.begin();
        let pending = Abortable::new(std::future::pending::<()>(), registration);
        let (second, _registration) = router.inner.begin();

        assert_eq!(second, first + 1);
        assert!(pending.await.is_err());
        assert!(router.inner.is_current(second));
        assert!(!router.inner.is_current(first));
    }

    #[tokio::test]
    async fn test_refresh_without_history() {
        let router = router();
        assert!(matches!(router.refresh().await, Err(NavigationError::NoHistory)));
    }

    #[tokio::test]
    async fn test_not_found_navigation_commits() {
        let router = router();
        let result = router.navigate("/missing", NavigationMode::Push).await.unwrap();
        assert_eq!(result.committed().unwrap().status, RenderStatus::NotFound);
    }
}
