//! Shared fixtures for integration tests.
#![allow(dead_code)]

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use app_router::config::{NavigationConfig, RouterConfig};
use app_router::http::{AppServer, HandlerRequest, HandlerResponse, RouteHandler};
use app_router::metadata::Metadata;
use app_router::navigation::{ClientRouter, MountHooks};
use app_router::render::{
    DataRequest, DataSource, FetchError, InstanceKey, Outcome, RedirectSignal, RenderError, RenderPipeline,
    SlotContext, View,
};
use app_router::resolve::{Params, SearchParams};
use app_router::tree::{RouteTree, RouteTreeBuilder, SlotKind};

/// A switch that holds fetches until opened.
#[derive(Default)]
pub struct Gate {
    open: AtomicBool,
    notify: Notify,
}

impl Gate {
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.open.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Data source with per-resource gates and call accounting.
#[derive(Default)]
pub struct GatedSource {
    values: HashMap<String, Value>,
    /// Gate per resource and the number of calls let through before it.
    gates: HashMap<String, (usize, Arc<Gate>)>,
    calls: Mutex<HashMap<String, usize>>,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
}

impl GatedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: &str, value: Value) -> Self {
        self.values.insert(resource.to_string(), value);
        self
    }

    /// Hold fetches of `resource` until its gate opens.
    pub fn gated(self, resource: &str) -> Self {
        self.gated_after(resource, 0)
    }

    /// Like `gated`, but the first `free` calls pass straight through.
    pub fn gated_after(mut self, resource: &str, free: usize) -> Self {
        self.gates.insert(resource.to_string(), (free, Arc::new(Gate::default())));
        self
    }

    pub fn gate(&self, resource: &str) -> Arc<Gate> {
        self.gates[resource].1.clone()
    }

    pub fn calls(&self, resource: &str) -> usize {
        self.calls.lock().unwrap().get(resource).copied().unwrap_or(0)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Fetches dropped before they finished.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct InFlight<'a> {
    source: &'a GatedSource,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.source.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl DataSource for GatedSource {
    async fn fetch(&self, resource: &str, _params: &Value) -> Result<Value, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(resource.to_string()).or_default();
            *count += 1;
            *count
        };
        let mut in_flight = InFlight { source: self, done: false };
        if let Some((free, gate)) = self.gates.get(resource) {
            if call > *free {
                gate.wait().await;
            }
        }
        in_flight.done = true;
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.values
            .get(resource)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(resource.to_string()))
    }
}

/// Mount hooks that record every call in order.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn unmounted_slots(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("unmount:").map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl MountHooks for RecordingHooks {
    fn mounted(&self, key: &InstanceKey) {
        self.events.lock().unwrap().push(format!("mount:{}", key.slot));
    }

    fn unmounted(&self, key: &InstanceKey) {
        self.events.lock().unwrap().push(format!("unmount:{}", key.slot));
    }
}

pub struct EchoHandler;

#[async_trait]
impl RouteHandler for EchoHandler {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        HandlerResponse::json(
            200,
            &json!({
                "method": request.method,
                "path": request.path,
                "body": String::from_utf8_lossy(&request.body),
            }),
        )
    }
}

fn failing(segment: &'static str) -> impl Fn(&SlotContext<'_>, View) -> Outcome<View> + Send + Sync {
    move |_: &SlotContext<'_>, _: View| Outcome::Error(RenderError::slot(segment, SlotKind::Page, "exploded"))
}

/// Shop-style fixture:
///
/// ```text
/// /                   layout page not-found   title template "%s | Acme"
/// (marketing)/about   page                    title "About"
/// shop                layout template loading page
/// shop/[item]         page, data item/<id>
/// feed                loading page, data feed
/// dashboard           layout error page
/// dashboard/broken    page (fails, caught by dashboard)
/// account             layout (shows session user), data session
/// account/profile     page
/// account/orders      page
/// boom                page (fails, uncaught)
/// old-shop            page (permanent redirect to /shop)
/// login               page (temporary redirect to /about)
/// docs/[[...path]]    page
/// _drafts/secret      page (private)
/// api/echo            handler
/// ```
pub fn fixture_tree() -> RouteTree {
    use SlotKind::*;

    RouteTreeBuilder::new()
        .slots("", &[Layout, Page, NotFound])
        .metadata("", Metadata::new().title_template("Acme", "%s | Acme"))
        .slot("(marketing)/about", Page)
        .metadata("(marketing)/about", Metadata::new().title("About"))
        .slots("shop", &[Layout, Template, Loading, Page])
        .slot("shop/[item]", Page)
        .data("shop/[item]", |params: &Params, _: &SearchParams| {
            let id = params.get("item").and_then(|v| v.as_str()).unwrap_or_default();
            vec![DataRequest::new(format!("item/{}", id), json!({}))]
        })
        .render("shop/[item]", Page, |ctx: &SlotContext<'_>, _: View| {
            let name = ctx
                .data(0)
                .and_then(|v| v["name"].as_str())
                .unwrap_or("unknown")
                .to_string();
            Outcome::Continue(View::element("article", vec![View::text(name)]))
        })
        .slots("feed", &[Loading, Page])
        .data("feed", |_: &Params, _: &SearchParams| vec![DataRequest::new("feed", json!({}))])
        .render("feed", Page, |ctx: &SlotContext<'_>, _: View| {
            let items = ctx
                .data(0)
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .map(|v| {
                    let label = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    View::element("li", vec![View::text(label)])
                })
                .collect();
            Outcome::Continue(View::element("ul", items))
        })
        .slots("dashboard", &[Layout, Error, Page])
        .render("dashboard/broken", Page, failing("dashboard/broken"))
        .render("boom", Page, failing("boom"))
        .render("account", Layout, |ctx: &SlotContext<'_>, children: View| {
            let user = ctx
                .data(0)
                .and_then(|v| v["user"].as_str())
                .unwrap_or("anonymous")
                .to_string();
            Outcome::Continue(View::element("section", vec![View::text(user), children]))
        })
        .data("account", |_: &Params, _: &SearchParams| {
            vec![DataRequest::new("session", json!({}))]
        })
        .slot("account/profile", Page)
        .slot("account/orders", Page)
        .render("old-shop", Page, |_: &SlotContext<'_>, _: View| {
            Outcome::Redirect(RedirectSignal::permanent("/shop"))
        })
        .render("login", Page, |_: &SlotContext<'_>, _: View| {
            Outcome::Redirect(RedirectSignal::temporary("/about"))
        })
        .slot("docs/[[...path]]", Page)
        .slot("_drafts/secret", Page)
        .handler("api/echo", EchoHandler)
        .build()
        .expect("fixture tree builds")
}

pub fn pipeline(source: Arc<GatedSource>) -> RenderPipeline {
    RenderPipeline::new(Arc::new(fixture_tree()), source)
}

pub fn client(source: Arc<GatedSource>, hooks: Arc<RecordingHooks>) -> ClientRouter {
    ClientRouter::with_hooks(pipeline(source), NavigationConfig::default(), hooks)
}

pub fn app(source: Arc<GatedSource>) -> Router {
    let tree = Arc::new(ArcSwap::from_pointee(fixture_tree()));
    AppServer::new(RouterConfig::default(), tree, source).router()
}
