//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all render handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Resolve every request against the live route tree
//! - Dispatch to protocol handlers or the render pipeline
//! - Observability (metrics, correlation IDs)

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::Response,
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::http::request::{self, UuidRequestId};
use crate::http::response;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::render::{DataSource, RenderPipeline, RenderSettings, RenderTarget};
use crate::resolve::RequestPath;
use crate::tree::RouteTree;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live route tree; swapped by the manifest watcher.
    pub tree: Arc<ArcSwap<RouteTree>>,
    pub source: Arc<dyn DataSource>,
    pub render: RenderSettings,
}

/// HTTP transport for the app router.
pub struct AppServer {
    router: Router,
    config: RouterConfig,
}

impl AppServer {
    pub fn new(config: RouterConfig, tree: Arc<ArcSwap<RouteTree>>, source: Arc<dyn DataSource>) -> Self {
        let state = AppState {
            tree,
            source,
            render: RenderSettings::from(&config.render),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RouterConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(app_handler))
            .route("/", any(app_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The router, for serving or for driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

/// Resolve, then either dispatch to a protocol handler or render.
async fn app_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request::request_id(request.headers());
    let method = request.method().clone();
    let target = request::target(&request);

    let tree = state.tree.load_full();
    let pipeline = RenderPipeline::new(tree.clone(), state.source.clone()).with_settings(state.render);
    let resolved = pipeline.resolve(&RequestPath::parse(&target));
    let route = match &resolved {
        RenderTarget::Matched(chain) => chain.pattern().to_string(),
        RenderTarget::NotFound(_) => "unmatched".to_string(),
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        target = %target,
        route = %route,
        "Handling request"
    );

    if let RenderTarget::Matched(chain) = &resolved {
        let handler = chain
            .leaf()
            .and_then(|id| tree.node(id).capabilities.handler.clone());
        if let Some(handler) = handler {
            let response = match request::to_handler_request(request, chain).await {
                Ok(req) => response::from_handler(handler.handle(req).await),
                Err(e) => {
                    tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
                    response::failure_page()
                }
            };
            metrics::record_request(method.as_str(), response.status().as_u16(), &route, start);
            return response;
        }
    }

    if method != Method::GET && method != Method::HEAD {
        metrics::record_request(method.as_str(), 405, &route, start);
        return response::method_not_allowed();
    }

    let render = pipeline.stream(resolved, 0).await;
    let status = render.status.http_status();
    if status >= 500 {
        tracing::error!(request_id = %request_id, route = %route, "Render failed");
    }
    metrics::record_request(method.as_str(), status, &route, start);
    response::document(render)
}
