//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → shared to server, pipeline and router
//!
//! On manifest change:
//!     watcher.rs detects change
//!     → loader.rs loads the manifest
//!     → RouteTreeBuilder rebuilds and validates the tree
//!     → atomic swap of Arc<RouteTree>
//!     → new requests resolve against the new tree
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_manifest, manifest_for, ConfigError};
pub use schema::{
    ListenerConfig, NavigationConfig, ObservabilityConfig, RenderConfig, RouterConfig, RoutesConfig,
    TimeoutConfig,
};
pub use validation::ValidationError;
pub use watcher::ManifestWatcher;
