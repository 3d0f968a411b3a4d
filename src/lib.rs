//! File-system route resolution and composable rendering.
//!
//! # Architecture Overview
//!
//! ```text
//!   route manifest / builder
//!           │
//!           ▼
//!   ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//!   │     tree     │────▶│   resolve    │────▶│      render      │──▶ shell + chunks
//!   │ (RouteTree)  │     │ (MatchChain) │  ┌─▶│ (RenderPipeline) │
//!   └──────────────┘     └──────┬───────┘  │  └──────────────────┘
//!                               │          │
//!                               ▼          │
//!                        ┌──────────────┐  │
//!                        │   metadata   │──┘ (head, resolved alongside the shell)
//!                        └──────────────┘
//!
//!   http        server-side transport (axum)
//!   navigation  client-side router driving resolve + render repeatedly
//!   config, observability, lifecycle: cross-cutting concerns
//! ```

// Core subsystems
pub mod metadata;
pub mod navigation;
pub mod render;
pub mod resolve;
pub mod tree;

// Transport
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::RouterConfig;
pub use http::AppServer;
pub use lifecycle::Shutdown;
pub use navigation::{ClientRouter, NavigationMode};
pub use render::{RenderPipeline, RenderTarget};
pub use resolve::{MatchChain, RequestPath, SegmentResolver};
pub use tree::{RouteTree, RouteTreeBuilder, SlotKind};
