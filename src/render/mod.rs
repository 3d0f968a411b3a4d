//! Render pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! MatchChain
//!     → fetch.rs (per-pass RequestCache, deduplicated fetches)
//!     → pipeline.rs (nested composition, boundaries, signals)
//!     → view.rs (View tree, HTML serialization)
//!     → stream.rs (shell + deferred boundary chunks)
//! ```
//!
//! # Design Decisions
//! - Control flow (not-found, error, redirect) is a tagged [`Outcome`],
//!   never a panic or unwind
//! - Instance identity ([`InstanceKey`]) is computed here so the client
//!   router can diff compositions without knowing the tree

pub mod fetch;
pub mod identity;
pub mod outcome;
pub mod pipeline;
pub mod stream;
pub mod view;

pub use fetch::{DataDependencies, DataRequest, DataSource, FetchError, LevelData, RequestCache, StaticDataSource};
pub use identity::InstanceKey;
pub use outcome::{Outcome, RedirectKind, RedirectSignal, RenderError};
pub use pipeline::{RenderPipeline, RenderSettings, RenderTarget};
pub use stream::{DeferredChunks, RenderPayload, RenderStatus, RenderStream, StreamChunk};
pub use view::{BoundaryId, SlotContext, SlotRenderer, View};
