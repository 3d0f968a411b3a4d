//! Client navigation subsystem.
//!
//! # Data Flow
//! ```text
//! link click / programmatic call
//!     → router.rs (generation, cancellation, redirects)
//!     → prefetch.rs (hit?) | RenderPipeline (fresh pass)
//!     → mount.rs (keep / mount / unmount instances)
//!     → history.rs (push | replace | traverse)
//! ```

pub mod history;
pub mod mount;
pub mod prefetch;
pub mod router;

pub use history::{HistoryStack, NavigationEntry, ScrollPosition};
pub use mount::{MountDiff, MountHooks, MountedTree, NoopHooks};
pub use prefetch::{PrefetchCache, PrefetchEntry};
pub use router::{ClientRouter, Committed, NavigationError, NavigationMode, NavigationResult};
