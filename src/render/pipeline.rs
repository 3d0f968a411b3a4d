//! Nested composition of a match chain.
//!
//! # Responsibilities
//! - Issue every chain node's data requests at the start of the pass
//! - Compose each level as
//!   `Layout → Template → ErrorBoundary → Suspense(Loading) → NotFoundBoundary → child | Page`
//! - Route not-found, error and redirect outcomes to the nearest boundary
//! - Produce the shell first, deferring suspended regions whose data is
//!   still in flight
//! - Resolve metadata alongside the shell with the same request cache
//!
//! # Data Flow
//! ```text
//! RenderTarget (matched chain | attempted chain)
//!     → Pass::new (issue fetches, compute suspension points)
//!     → level(0) ─┬─ ready regions render inline
//!                 └─ pending regions: fallback now, spawned task → StreamChunk
//!     → join with MetadataResolver::resolve
//!     → RenderStream
//! ```
//!
//! # Design Decisions
//! - A node's data suspends to the boundary enclosing the first slot that
//!   reads it: its layout or template when it has one, otherwise its page
//! - The root always catches not-found, with its own slot or the global
//!   default view
//! - Deferred regions that fail after the shell was sent are settled into
//!   their boundary by the nearest error or not-found slot above them

use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::config::schema::RenderConfig;
use crate::metadata::MetadataResolver;
use crate::observability::metrics;
use crate::render::fetch::{DataSource, FetchError, LevelData, RequestCache, RequestKey, SharedFetch, TaskSet};
use crate::render::identity::InstanceKey;
use crate::render::outcome::{Outcome, RenderError};
use crate::render::stream::{PassGuard, RenderPayload, RenderStatus, RenderStream, StreamChunk};
use crate::render::view::{default_view, not_found_view, BoundaryId, SlotContext, View};
use crate::resolve::{MatchChain, Params, RequestPath, RouteNotFoundError, SegmentResolver};
use crate::tree::{RouteNode, RouteTree, SlotKind};

type Sink = Option<mpsc::UnboundedSender<StreamChunk>>;

/// Unwrap a `Continue`, or return the signal from the enclosing function.
macro_rules! proceed {
    ($outcome:expr) => {
        match $outcome.into_signal() {
            Ok(value) => value,
            Err(signal) => return signal,
        }
    };
}

/// What to render.
#[derive(Debug, Clone)]
pub enum RenderTarget {
    Matched(MatchChain),
    /// Render the nearest not-found boundary along the attempted chain.
    NotFound(RouteNotFoundError),
}

impl RenderTarget {
    pub fn chain(&self) -> &MatchChain {
        match self {
            RenderTarget::Matched(chain) => chain,
            RenderTarget::NotFound(err) => &err.attempted,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RenderTarget::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    /// Defer suspended regions instead of waiting for them.
    pub streaming: bool,
    pub fetch_timeout: Option<Duration>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            streaming: true,
            fetch_timeout: None,
        }
    }
}

impl From<&RenderConfig> for RenderSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            streaming: config.streaming,
            fetch_timeout: (config.fetch_timeout_ms > 0)
                .then(|| Duration::from_millis(config.fetch_timeout_ms)),
        }
    }
}

/// Renders match chains against one tree and one data source.
#[derive(Clone)]
pub struct RenderPipeline {
    tree: Arc<RouteTree>,
    source: Arc<dyn DataSource>,
    settings: RenderSettings,
}

impl RenderPipeline {
    pub fn new(tree: Arc<RouteTree>, source: Arc<dyn DataSource>) -> Self {
        Self {
            tree,
            source,
            settings: RenderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tree(&self) -> &Arc<RouteTree> {
        &self.tree
    }

    pub fn resolve(&self, path: &RequestPath) -> RenderTarget {
        match SegmentResolver::new(&self.tree).resolve(path) {
            Ok(chain) => RenderTarget::Matched(chain),
            Err(err) => RenderTarget::NotFound(err),
        }
    }

    /// Render the shell; suspended regions follow as chunks when streaming
    /// is enabled.
    pub async fn stream(&self, target: RenderTarget, navigation: u64) -> RenderStream {
        self.run(target, navigation, self.settings.streaming, &[]).await.0
    }

    /// Render everything before returning.
    pub async fn render(&self, target: RenderTarget, navigation: u64) -> RenderPayload {
        self.render_reusing(target, navigation, &[]).await
    }

    /// Render everything, serving the leading chain levels from `reused`.
    ///
    /// `reused` is the settled data of a previous render whose chain shares
    /// a prefix with `target`; its requests are answered without asking the
    /// data source. Levels stop being reused at the first node that differs.
    pub async fn render_reusing(&self, target: RenderTarget, navigation: u64, reused: &[LevelData]) -> RenderPayload {
        let (stream, pass) = self.run(target, navigation, false, reused).await;
        let mut payload = stream.collect().await;
        payload.data = pass.settled();
        payload
    }

    async fn run(
        &self,
        target: RenderTarget,
        navigation: u64,
        streaming: bool,
        reused: &[LevelData],
    ) -> (RenderStream, Arc<Pass>) {
        let started = Instant::now();
        let not_found = target.is_not_found();
        let chain = match target {
            RenderTarget::Matched(chain) => chain,
            RenderTarget::NotFound(err) => err.attempted,
        };

        let cache = Arc::new(RequestCache::new(self.source.clone()).with_timeout(self.settings.fetch_timeout));
        let kept = reused
            .iter()
            .zip(chain.links())
            .take_while(|(level, link)| level.node == link.node)
            .map(|(level, _)| level);
        for level in kept {
            for (key, value) in &level.results {
                cache.seed(key.clone(), value.clone());
            }
        }
        let pass = Arc::new(Pass::new(self.tree.clone(), chain, not_found, navigation, cache));
        let guard = PassGuard::new(pass.deferred.clone(), pass.cache.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = streaming.then_some(tx);

        let resolver = MetadataResolver::new(&pass.tree);
        let (shell, head) = tokio::join!(
            pass.clone().level(0, sink),
            resolver.resolve(&pass.chain, &pass.cache)
        );

        let (status, body) = match shell {
            Outcome::Continue(view) if pass.not_found_rendered.load(Ordering::Acquire) => {
                (RenderStatus::NotFound, Some(view))
            }
            Outcome::Continue(view) => (RenderStatus::Ok, Some(view)),
            // root catches not-found; kept for renderers that re-raise it
            Outcome::NotFound => (RenderStatus::NotFound, Some(not_found_view())),
            Outcome::Redirect(signal) => (RenderStatus::Redirect(signal), None),
            Outcome::Error(err) => (RenderStatus::Failed(err), None),
        };
        if body.is_none() {
            pass.deferred.abort_all();
        }

        match &status {
            RenderStatus::Failed(err) => tracing::error!(
                route = %pass.chain.pattern(),
                path = %pass.chain.pathname(),
                error = %err,
                "Render failed at root"
            ),
            RenderStatus::Redirect(signal) => tracing::debug!(
                path = %pass.chain.pathname(),
                location = %signal.location,
                "Render redirected"
            ),
            _ => tracing::debug!(
                route = %pass.chain.pattern(),
                status = status.label(),
                fetches = pass.cache.issued(),
                deduplicated = pass.cache.deduplicated(),
                reused = pass.cache.seeded(),
                "Shell rendered"
            ),
        }
        metrics::record_render(pass.chain.pattern(), status.label(), started);

        (RenderStream::new(status, body, head, rx, guard), pass)
    }
}

/// State of one render pass.
struct Pass {
    tree: Arc<RouteTree>,
    chain: MatchChain,
    /// Render the attempted chain with a not-found leaf.
    not_found: bool,
    navigation: u64,
    cache: Arc<RequestCache>,
    /// Issued fetches per chain level.
    fetches: Vec<Vec<(RequestKey, SharedFetch)>>,
    /// Parameters visible at each level (root down to the level).
    scopes: Vec<Params>,
    /// Depth of the boundary each level's data suspends to.
    suspends_to: Vec<Option<usize>>,
    not_found_rendered: AtomicBool,
    deferred: Arc<TaskSet>,
}

impl Pass {
    fn new(tree: Arc<RouteTree>, chain: MatchChain, not_found: bool, navigation: u64, cache: Arc<RequestCache>) -> Self {
        let mut scopes = Vec::with_capacity(chain.len());
        let mut scope = Params::new();
        for link in chain.links() {
            scope.extend(link.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            scopes.push(scope.clone());
        }

        let fetches = chain
            .links()
            .iter()
            .zip(&scopes)
            .map(|(link, params)| match &tree.node(link.node).capabilities.resolve_data {
                Some(deps) => deps
                    .requests(params, chain.search_params())
                    .iter()
                    .map(|req| (req.key(), cache.request(&req.resource, &req.params)))
                    .collect(),
                None => Vec::new(),
            })
            .collect();

        let suspends_to = (0..chain.len())
            .map(|depth| {
                let node = tree.node(chain.links()[depth].node);
                let read_outside = node.has_slot(SlotKind::Layout) || node.has_slot(SlotKind::Template);
                let limit = if read_outside { depth } else { depth + 1 };
                (0..limit)
                    .rev()
                    .find(|k| tree.node(chain.links()[*k].node).has_slot(SlotKind::Loading))
            })
            .collect();

        Self {
            tree,
            chain,
            not_found,
            navigation,
            cache,
            fetches,
            scopes,
            suspends_to,
            not_found_rendered: AtomicBool::new(false),
            deferred: Arc::new(TaskSet::default()),
        }
    }

    fn node(&self, depth: usize) -> &RouteNode {
        self.tree.node(self.chain.links()[depth].node)
    }

    async fn data(&self, depth: usize) -> Result<Vec<Arc<Value>>, FetchError> {
        try_join_all(self.fetches[depth].iter().map(|(_, fetch)| fetch.clone())).await
    }

    /// Values of every fetch that succeeded, per chain level.
    fn settled(&self) -> Vec<LevelData> {
        self.chain
            .links()
            .iter()
            .zip(&self.fetches)
            .map(|(link, fetches)| LevelData {
                node: link.node,
                results: fetches
                    .iter()
                    .filter_map(|(key, fetch)| match fetch.peek() {
                        Some(Ok(value)) => Some((key.clone(), value.clone())),
                        _ => None,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Every fetch suspending to `boundary` has settled.
    fn region_ready(&self, boundary: usize) -> bool {
        self.suspends_to
            .iter()
            .zip(&self.fetches)
            .filter(|(target, _)| **target == Some(boundary))
            .all(|(_, fetches)| fetches.iter().all(|(_, f)| f.peek().is_some()))
    }

    fn render_slot(
        &self,
        depth: usize,
        slot: SlotKind,
        children: View,
        data: &[Arc<Value>],
        error: Option<&RenderError>,
    ) -> Outcome<View> {
        let node = self.node(depth);
        let ctx = SlotContext {
            slot,
            node,
            params: &self.scopes[depth],
            search: self.chain.search_params(),
            data,
            error,
        };
        let rendered = match node.renderer(slot) {
            Some(renderer) => renderer.render(&ctx, children),
            None => Outcome::Continue(default_view(&ctx, children)),
        };
        rendered.map(|view| View::Frame {
            key: InstanceKey::new(slot, node.id, depth, self.navigation),
            child: Box::new(view),
        })
    }

    /// Layout and template around the guarded inner region.
    fn level(self: Arc<Self>, depth: usize, sink: Sink) -> BoxFuture<'static, Outcome<View>> {
        async move {
            let wrappers: Vec<SlotKind> = [SlotKind::Template, SlotKind::Layout]
                .into_iter()
                .filter(|slot| self.node(depth).has_slot(*slot))
                .collect();
            let data = if wrappers.is_empty() {
                Vec::new()
            } else {
                match self.data(depth).await {
                    Ok(data) => data,
                    Err(err) => return Outcome::Error(err.into()),
                }
            };

            let mut view = proceed!(self.clone().guarded(depth, sink).await);
            for slot in wrappers {
                view = proceed!(self.render_slot(depth, slot, view, &data, None));
            }
            Outcome::Continue(view)
        }
        .boxed()
    }

    /// Error boundary.
    async fn guarded(self: Arc<Self>, depth: usize, sink: Sink) -> Outcome<View> {
        match self.clone().suspended(depth, sink).await {
            Outcome::Error(err) if self.catches_error(depth, &err) => self.render_error(depth, &err),
            other => other,
        }
    }

    fn catches_error(&self, depth: usize, err: &RenderError) -> bool {
        !matches!(err, RenderError::Cancelled) && self.node(depth).has_slot(SlotKind::Error)
    }

    fn render_error(&self, depth: usize, err: &RenderError) -> Outcome<View> {
        tracing::debug!(
            segment = %self.node(depth).folder,
            error = %err,
            "Error boundary caught failure"
        );
        self.render_slot(depth, SlotKind::Error, View::empty(), &[], Some(err))
    }

    /// Suspense boundary.
    async fn suspended(self: Arc<Self>, depth: usize, sink: Sink) -> Outcome<View> {
        if !self.node(depth).has_slot(SlotKind::Loading) {
            return self.bounded(depth, sink).await;
        }

        let fallback = proceed!(self.render_slot(depth, SlotKind::Loading, View::empty(), &[], None));
        let defer_to = sink.as_ref().filter(|_| !self.region_ready(depth)).cloned();
        let content = match defer_to {
            Some(tx) => {
                self.defer(depth, tx);
                None
            }
            None => Some(Box::new(proceed!(self.clone().bounded(depth, sink).await))),
        };

        Outcome::Continue(View::Suspense {
            id: depth,
            fallback: Box::new(fallback),
            content,
        })
    }

    /// Render the region inside boundary `depth` in the background.
    fn defer(self: &Arc<Self>, depth: BoundaryId, tx: mpsc::UnboundedSender<StreamChunk>) {
        tracing::debug!(segment = %self.node(depth).folder, boundary = depth, "Boundary deferred");
        let pass = self.clone();
        let task = tokio::spawn(async move {
            let outcome = pass.clone().bounded(depth, Some(tx.clone())).await;
            let chunk = pass.settle(depth, outcome);
            tracing::debug!(boundary = depth, "Boundary streamed");
            let _ = tx.send(chunk);
        });
        self.deferred.track(task.abort_handle());
    }

    /// Turn a deferred region's outcome into a chunk for its boundary.
    fn settle(&self, boundary: BoundaryId, outcome: Outcome<View>) -> StreamChunk {
        let settled = match outcome {
            Outcome::NotFound => (0..boundary)
                .rev()
                .find(|k| *k == 0 || self.node(*k).has_slot(SlotKind::NotFound))
                .map(|k| self.render_not_found(k))
                .unwrap_or(Outcome::Continue(not_found_view())),
            // the boundary's own error slot sits outside the suspense
            Outcome::Error(err) => match (0..=boundary).rev().find(|k| self.catches_error(*k, &err)) {
                Some(k) => self.render_error(k, &err),
                None => Outcome::Error(err),
            },
            other => other,
        };

        match settled {
            Outcome::Continue(view) => StreamChunk::Boundary { id: boundary, view },
            Outcome::Redirect(signal) => StreamChunk::Redirect(signal),
            Outcome::Error(error) => StreamChunk::Failed { id: boundary, error },
            Outcome::NotFound => StreamChunk::Boundary {
                id: boundary,
                view: not_found_view(),
            },
        }
    }

    /// Not-found boundary around the child level or the page.
    async fn bounded(self: Arc<Self>, depth: usize, sink: Sink) -> Outcome<View> {
        let inner = if depth + 1 < self.chain.len() {
            self.clone().level(depth + 1, sink).await
        } else {
            self.leaf(depth).await
        };

        match inner {
            Outcome::NotFound if depth == 0 || self.node(depth).has_slot(SlotKind::NotFound) => {
                self.render_not_found(depth)
            }
            other => other,
        }
    }

    fn render_not_found(&self, depth: usize) -> Outcome<View> {
        let node = self.node(depth);
        self.not_found_rendered.store(true, Ordering::Release);
        tracing::debug!(segment = %node.folder, path = %self.chain.pathname(), "Rendering not-found");
        if node.has_slot(SlotKind::NotFound) {
            self.render_slot(depth, SlotKind::NotFound, View::empty(), &[], None)
        } else {
            Outcome::Continue(not_found_view())
        }
    }

    async fn leaf(&self, depth: usize) -> Outcome<View> {
        if self.not_found || !self.node(depth).has_slot(SlotKind::Page) {
            return Outcome::NotFound;
        }
        let data = match self.data(depth).await {
            Ok(data) => data,
            Err(err) => return Outcome::Error(err.into()),
        };
        self.render_slot(depth, SlotKind::Page, View::empty(), &data, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fetch::{DataRequest, StaticDataSource};
    use crate::render::outcome::RedirectSignal;
    use crate::resolve::SearchParams;
    use crate::tree::RouteTreeBuilder;
    use serde_json::json;
    use SlotKind::*;

    fn pipeline(tree: RouteTree, source: StaticDataSource) -> RenderPipeline {
        RenderPipeline::new(Arc::new(tree), Arc::new(source))
    }

    fn slots_of(view: &View) -> Vec<(SlotKind, usize)> {
        let mut out = Vec::new();
        view.visit_frames(&mut |key, _| out.push((key.slot, key.depth)));
        out
    }

    async fn render(p: &RenderPipeline, target: &str) -> RenderPayload {
        let target = p.resolve(&RequestPath::parse(target));
        p.render(target, 1).await
    }

    #[tokio::test]
    async fn test_composition_order() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, NotFound])
            .slots("blog", &[Layout, Template, Error, Loading, Page])
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/blog").await;

        assert_eq!(payload.status, RenderStatus::Ok);
        assert_eq!(
            slots_of(payload.body.as_ref().unwrap()),
            vec![(Layout, 0), (Layout, 1), (Template, 1), (Page, 1)]
        );
        let html = payload.body.unwrap().to_html();
        assert!(html.starts_with("<div data-layout=\"\"><div data-layout=\"blog\"><div data-template=\"blog\"><!--$-->"));
    }

    #[tokio::test]
    async fn test_error_replaces_only_failing_subtree() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout])
            .slots("dashboard", &[Layout, Error])
            .render("dashboard/stats", Page, |_: &SlotContext<'_>, _: View| {
                Outcome::Error(RenderError::slot("dashboard/stats", Page, "boom"))
            })
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/dashboard/stats").await;

        assert_eq!(payload.status, RenderStatus::Ok);
        assert_eq!(
            slots_of(payload.body.as_ref().unwrap()),
            vec![(Layout, 0), (Layout, 1), (Error, 1)]
        );
        assert!(payload.body.unwrap().to_html().contains("boom"));
    }

    #[tokio::test]
    async fn test_unhandled_error_fails_render() {
        let tree = RouteTreeBuilder::new()
            .slot("", Layout)
            .render("broken", Page, |_: &SlotContext<'_>, _: View| {
                Outcome::Error(RenderError::slot("broken", Page, "boom"))
            })
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/broken").await;
        assert!(matches!(payload.status, RenderStatus::Failed(_)));
        assert!(payload.body.is_none());
    }

    #[tokio::test]
    async fn test_layout_error_goes_to_ancestor_boundary() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Error])
            .render("shop", Layout, |_: &SlotContext<'_>, _: View| {
                Outcome::Error(RenderError::slot("shop", Layout, "layout down"))
            })
            .slot("shop", Error)
            .slot("shop", Page)
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/shop").await;
        assert_eq!(slots_of(payload.body.as_ref().unwrap()), vec![(Layout, 0), (Error, 0)]);
    }

    #[tokio::test]
    async fn test_not_found_signal_walks_up() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout])
            .slots("blog", &[Layout, NotFound])
            .render("blog/[slug]", Page, |ctx: &SlotContext<'_>, _: View| {
                if ctx.param("slug") == Some("missing") {
                    Outcome::NotFound
                } else {
                    Outcome::Continue(View::text("post"))
                }
            })
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());

        let payload = render(&p, "/blog/missing").await;
        assert_eq!(payload.status, RenderStatus::NotFound);
        assert_eq!(
            slots_of(payload.body.as_ref().unwrap()),
            vec![(Layout, 0), (Layout, 1), (NotFound, 1)]
        );

        let payload = render(&p, "/blog/hello").await;
        assert_eq!(payload.status, RenderStatus::Ok);
    }

    #[tokio::test]
    async fn test_unmatched_path_uses_global_default_inside_root_layout() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Page])
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/nope").await;

        assert_eq!(payload.status, RenderStatus::NotFound);
        let html = payload.body.unwrap().to_html();
        assert!(html.contains("This page could not be found."));
        assert!(html.starts_with("<div data-layout=\"\">"));
    }

    #[tokio::test]
    async fn test_redirect_aborts_render() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Error])
            .render("old", Page, |_: &SlotContext<'_>, _: View| {
                Outcome::Redirect(RedirectSignal::permanent("/new"))
            })
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/old").await;
        assert_eq!(
            payload.status,
            RenderStatus::Redirect(RedirectSignal::permanent("/new"))
        );
        assert!(payload.body.is_none());
    }

    #[tokio::test]
    async fn test_template_key_carries_navigation() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Template, Page])
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let target = p.resolve(&RequestPath::parse("/"));
        let first = p.render(target.clone(), 1).await.body.unwrap();
        let second = p.render(target, 2).await.body.unwrap();

        let keys = |view: &View| {
            let mut keys = Vec::new();
            view.visit_frames(&mut |key, _| keys.push(*key));
            keys
        };
        let (a, b) = (keys(&first), keys(&second));
        assert_eq!(a[0], b[0]); // layout
        assert_ne!(a[1], b[1]); // template
    }

    #[tokio::test]
    async fn test_data_is_shared_within_pass() {
        let user = |_: &Params, _: &SearchParams| vec![DataRequest::new("user", json!({"id": 1}))];
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout])
            .data("", user)
            .render("account", Page, |ctx: &SlotContext<'_>, _: View| {
                let name = ctx.data(0).and_then(|v| v["name"].as_str()).unwrap_or("?");
                Outcome::Continue(View::text(name))
            })
            .data("account", user)
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new().with("user", json!({"name": "ada"})));
        let payload = render(&p, "/account").await;
        assert!(payload.body.unwrap().to_html().contains("ada"));
    }

    #[tokio::test]
    async fn test_reused_levels_skip_the_source() {
        let account = || {
            RouteTreeBuilder::new()
                .slots("", &[Layout, Error])
                .render("account", Layout, |ctx: &SlotContext<'_>, children: View| {
                    let user = ctx.data(0).and_then(|v| v["user"].as_str()).unwrap_or("?");
                    Outcome::Continue(View::element("section", vec![View::text(user), children]))
                })
                .data("account", |_: &Params, _: &SearchParams| {
                    vec![DataRequest::new("session", Value::Null)]
                })
                .slot("account/profile", Page)
                .slot("account/orders", Page)
                .build()
                .unwrap()
        };
        let first = pipeline(account(), StaticDataSource::new().with("session", json!({"user": "ada"})));
        let payload = render(&first, "/account/profile").await;
        assert_eq!(payload.data.len(), 3);
        assert_eq!(payload.data[1].results.len(), 1);

        // the second source has no session: the layout can only read the reused value
        let second = pipeline(account(), StaticDataSource::new());
        let target = second.resolve(&RequestPath::parse("/account/orders"));
        let next = second.render_reusing(target, 2, &payload.data).await;
        assert_eq!(next.status, RenderStatus::Ok);
        assert!(next.body.unwrap().to_html().contains("ada"));

        let target = second.resolve(&RequestPath::parse("/account/orders"));
        let cold = second.render(target, 3).await;
        assert_eq!(slots_of(cold.body.as_ref().unwrap()), vec![(Layout, 0), (Error, 0)]);
    }

    #[tokio::test]
    async fn test_data_failure_reaches_error_boundary() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Error])
            .slot("feed", Page)
            .data("feed", |_: &Params, _: &SearchParams| {
                vec![DataRequest::new("missing", Value::Null)]
            })
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/feed").await;
        assert_eq!(payload.status, RenderStatus::Ok);
        assert_eq!(slots_of(payload.body.as_ref().unwrap()), vec![(Layout, 0), (Error, 0)]);
    }

    #[tokio::test]
    async fn test_metadata_failure_keeps_body() {
        use crate::metadata::{MetadataContext, MetadataDecl, MetadataError, MetadataSource};
        use crate::metadata::Metadata;

        struct Failing;

        #[async_trait::async_trait]
        impl MetadataSource for Failing {
            async fn metadata(&self, _ctx: MetadataContext<'_>) -> Result<Metadata, MetadataError> {
                Err(MetadataError::Invalid("no title".into()))
            }
        }

        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Page])
            .metadata("", MetadataDecl::dynamic(Failing))
            .build()
            .unwrap();
        let p = pipeline(tree, StaticDataSource::new());
        let payload = render(&p, "/").await;
        assert_eq!(payload.status, RenderStatus::Ok);
        assert!(payload.body.is_some());
        assert!(payload.head.is_err());
        assert_eq!(payload.head_or_default().title, "");
    }
}
