//! Segment resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Request target ("/blog/hello?draft=1")
//!     → path.rs (normalize components, parse query)
//!     → matcher.rs (depth-first descent over level indexes)
//!     → Ok(MatchChain) | Err(RouteNotFoundError { attempted })
//! ```
//!
//! # Design Decisions
//! - Deterministic: same tree + same path always yields the same chain
//! - Failures keep the deepest partial chain so not-found walk-up only
//!   considers nodes that were actually on the attempted path

pub mod chain;
pub mod matcher;
pub mod path;

pub use chain::{ChainLink, MatchChain, ParamValue, Params};
pub use matcher::{RouteNotFoundError, SegmentResolver};
pub use path::{RequestPath, SearchParams};
