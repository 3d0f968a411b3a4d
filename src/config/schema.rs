//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::tree::ManifestEntry;

/// Root configuration for the app router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where the route manifest comes from.
    pub routes: RoutesConfig,

    /// Render pipeline settings.
    pub render: RenderConfig,

    /// Client navigation settings.
    pub navigation: NavigationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Route manifest source.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RoutesConfig {
    /// Path to a TOML route manifest. Takes precedence over `entries`.
    pub manifest_path: Option<String>,

    /// Rebuild the route tree when the manifest file changes.
    pub watch: bool,

    /// Inline manifest entries.
    #[serde(rename = "route")]
    pub entries: Vec<ManifestEntry>,
}

/// Render pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Stream the shell first and suspended regions as they resolve.
    pub streaming: bool,

    /// Per-fetch timeout in milliseconds (0 = none).
    pub fetch_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            fetch_timeout_ms: 10_000,
        }
    }
}

/// Client navigation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Maximum concurrent background prefetches.
    pub prefetch_concurrency: usize,

    /// Maximum prefetched entries kept.
    pub prefetch_capacity: usize,

    /// Age after which a prefetched entry is discarded, in seconds.
    pub prefetch_stale_secs: u64,

    /// Age after which a history snapshot is re-rendered on back/forward, in seconds.
    pub snapshot_stale_secs: u64,

    /// Prefetch links as they become visible.
    pub auto_prefetch: bool,

    /// Maximum history entries kept.
    pub history_capacity: usize,

    /// Redirects followed by one navigation before giving up.
    pub max_redirects: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            prefetch_concurrency: 4,
            prefetch_capacity: 64,
            prefetch_stale_secs: 30,
            snapshot_stale_secs: 30,
            auto_prefetch: true,
            history_capacity: 50,
            max_redirects: 5,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
