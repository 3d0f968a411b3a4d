//! Route tree subsystem.
//!
//! # Data Flow
//! ```text
//! Folder convention (manifest / marker files / builder calls)
//!     → segment.rs (classify folder names)
//!     → builder.rs (arena, capability records, level indexes, ambiguity checks)
//!     → RouteTree (immutable, shared via Arc by resolvers and the pipeline)
//! ```
//!
//! # Design Decisions
//! - Built once at startup (or on manifest reload), never mutated
//! - Nodes addressed by `NodeId` into a flat arena with parent/children indices
//! - Capabilities are attached at build time, never discovered per request

pub mod builder;
pub mod manifest;
pub mod node;
pub mod route_tree;
pub mod segment;

pub use builder::{AmbiguousRouteError, RouteTreeBuilder, TreeBuildError};
pub use manifest::{ManifestEntry, RouteManifest};
pub use node::{NodeCapabilities, NodeId, RouteNode, SlotKind, SlotRef, Slots};
pub use route_tree::{HrefError, RouteInfo, RouteTree};
pub use segment::SegmentKind;
