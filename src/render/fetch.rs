//! Data dependencies and the per-pass request cache.
//!
//! # Responsibilities
//! - Describe what a node needs before it renders ([`DataRequest`])
//! - Deduplicate request-equivalent fetches within one render pass
//! - Drive issued fetches in the background so independent nodes progress
//!   concurrently
//! - Abandon every in-flight fetch when the pass ends
//!
//! # Design Decisions
//! - One cache per render pass (server) or per navigation (client); never
//!   process-wide, so results cannot leak across requests
//! - Keys are `(resource, canonical JSON params)`; object keys are sorted,
//!   so `{"a":1,"b":2}` and `{"b":2,"a":1}` share one fetch
//! - Results are `Arc`ed so every consumer shares one value

use async_trait::async_trait;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;

use crate::observability::metrics;
use crate::resolve::{Params, SearchParams};
use crate::tree::NodeId;

/// Failure reported by the data layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("resource '{0}' not found")]
    NotFound(String),

    #[error("fetch of '{resource}' failed: {message}")]
    Failed { resource: String, message: String },

    #[error("fetch of '{0}' timed out")]
    Timeout(String),
}

impl FetchError {
    pub fn failed(resource: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Failed {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type FetchResult = Result<Arc<Value>, FetchError>;
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// The external data layer.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, resource: &str, params: &Value) -> Result<Value, FetchError>;
}

/// One resource a node needs before it renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub resource: String,
    pub params: Value,
}

impl DataRequest {
    pub fn new(resource: impl Into<String>, params: Value) -> Self {
        Self {
            resource: resource.into(),
            params,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.resource, &self.params)
    }
}

/// Computes a node's data requests from the request's parameters.
pub trait DataDependencies: Send + Sync {
    fn requests(&self, params: &Params, search: &SearchParams) -> Vec<DataRequest>;
}

impl<F> DataDependencies for F
where
    F: Fn(&Params, &SearchParams) -> Vec<DataRequest> + Send + Sync,
{
    fn requests(&self, params: &Params, search: &SearchParams) -> Vec<DataRequest> {
        self(params, search)
    }
}

/// Request-equivalence key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub resource: String,
    params: String,
}

impl RequestKey {
    pub fn new(resource: &str, params: &Value) -> Self {
        Self {
            resource: resource.to_string(),
            params: canonical(params),
        }
    }
}

/// JSON text with object keys in sorted order, at every level.
fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = fields
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// Data one chain level resolved during a pass.
///
/// Carried in the rendered payload so a later navigation that keeps this
/// level can serve the same requests without fetching them again.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelData {
    pub node: NodeId,
    pub results: Vec<(RequestKey, Arc<Value>)>,
}

/// Abort handles for background tasks owned by one pass.
#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    handles: Mutex<Vec<AbortHandle>>,
}

impl TaskSet {
    pub(crate) fn track(&self, handle: AbortHandle) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    pub(crate) fn abort_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            handle.abort();
        }
    }
}

/// Memoizes fetches for one render pass or navigation.
pub struct RequestCache {
    source: Arc<dyn DataSource>,
    timeout: Option<Duration>,
    entries: Mutex<HashMap<RequestKey, SharedFetch>>,
    drivers: TaskSet,
    issued: AtomicUsize,
    deduplicated: AtomicUsize,
    seeded: AtomicUsize,
}

impl RequestCache {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            timeout: None,
            entries: Mutex::new(HashMap::new()),
            drivers: TaskSet::default(),
            issued: AtomicUsize::new(0),
            deduplicated: AtomicUsize::new(0),
            seeded: AtomicUsize::new(0),
        }
    }

    /// Bound every fetch issued through this cache.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue (or join) the fetch for `(resource, params)`.
    ///
    /// The first call starts the fetch in the background; later equivalent
    /// calls share it.
    pub fn request(&self, resource: &str, params: &Value) -> SharedFetch {
        let key = RequestKey::new(resource, params);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key) {
            self.deduplicated.fetch_add(1, Ordering::Relaxed);
            metrics::record_fetch(true);
            tracing::trace!(resource = %resource, "Joined in-flight fetch");
            return existing.clone();
        }

        let source = self.source.clone();
        let timeout = self.timeout;
        let name = resource.to_string();
        let params = params.clone();
        let fut: BoxFuture<'static, FetchResult> = async move {
            let fetch = source.fetch(&name, &params);
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Timeout(name.clone()))),
                None => fetch.await,
            };
            result.map(Arc::new)
        }
        .boxed();
        let shared = fut.shared();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let driver = runtime.spawn(shared.clone());
            self.drivers.track(driver.abort_handle());
        }

        self.issued.fetch_add(1, Ordering::Relaxed);
        metrics::record_fetch(false);
        tracing::debug!(resource = %resource, "Fetch issued");
        entries.insert(key, shared.clone());
        shared
    }

    /// Serve `key` from an already-resolved value; the data source is never
    /// asked for it. An entry issued earlier in this pass is kept.
    pub fn seed(&self, key: RequestKey, value: Arc<Value>) {
        let ready: BoxFuture<'static, FetchResult> = future::ready(Ok(value)).boxed();
        let shared = ready.shared();
        // settle it now so `peek` sees the value before anyone awaits it
        let _ = shared.clone().now_or_never();

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(&key) {
            tracing::trace!(resource = %key.resource, "Seeded fetch from a previous pass");
            entries.insert(key, shared);
            self.seeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn fetch(&self, resource: &str, params: &Value) -> FetchResult {
        self.request(resource, params).await
    }

    /// Number of distinct fetches issued.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    /// Number of calls served by an already-issued fetch.
    pub fn deduplicated(&self) -> usize {
        self.deduplicated.load(Ordering::Relaxed)
    }

    /// Number of entries served from a previous pass.
    pub fn seeded(&self) -> usize {
        self.seeded.load(Ordering::Relaxed)
    }

    /// Stop driving every fetch issued so far.
    pub fn abandon(&self) {
        self.drivers.abort_all();
    }
}

impl Drop for RequestCache {
    fn drop(&mut self) {
        self.drivers.abort_all();
    }
}

/// In-memory data source serving fixed values by resource name.
#[derive(Debug, Clone, Default)]
pub struct StaticDataSource {
    resources: HashMap<String, Value>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: impl Into<String>, value: Value) -> Self {
        self.resources.insert(resource.into(), value);
        self
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, resource: &str, _params: &Value) -> Result<Value, FetchError> {
        self.resources
            .get(resource)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(resource.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataSource for Counting {
        async fn fetch(&self, resource: &str, params: &Value) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(json!({ "resource": resource, "params": params }))
        }
    }

    struct Never;

    #[async_trait]
    impl DataSource for Never {
        async fn fetch(&self, _resource: &str, _params: &Value) -> Result<Value, FetchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_dedups_request_equivalent_fetches() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let cache = RequestCache::new(source.clone());

        let args_a = json!({"id": 1, "full": true});
        let args_b = json!({"full": true, "id": 1});
        let (a, b) = tokio::join!(
            cache.fetch("user", &args_a),
            cache.fetch("user", &args_b),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.issued(), 1);
        assert_eq!(cache.deduplicated(), 1);

        cache.fetch("user", &json!({"id": 2})).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_caches_are_not_shared() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        RequestCache::new(source.clone()).fetch("x", &Value::Null).await.unwrap();
        RequestCache::new(source.clone()).fetch("x", &Value::Null).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        let cache = RequestCache::new(Arc::new(Never)).with_timeout(Some(Duration::from_millis(10)));
        let err = cache.fetch("slow", &Value::Null).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout("slow".into()));
    }

    #[tokio::test]
    async fn test_seeded_entries_skip_the_source() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let cache = RequestCache::new(source.clone());
        let params = json!({"id": 1});
        cache.seed(RequestKey::new("user", &params), Arc::new(json!({"name": "ada"})));

        assert!(cache.request("user", &params).peek().is_some());
        let value = cache.fetch("user", &params).await.unwrap();
        assert_eq!(*value, json!({"name": "ada"}));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.seeded(), 1);
        assert_eq!(cache.issued(), 0);

        // different params are a different request
        cache.fetch("user", &json!({"id": 2})).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticDataSource::new().with("posts", json!(["a", "b"]));
        assert_eq!(source.fetch("posts", &Value::Null).await.unwrap(), json!(["a", "b"]));
        assert!(matches!(
            source.fetch("missing", &Value::Null).await,
            Err(FetchError::NotFound(_))
        ));
    }
}
