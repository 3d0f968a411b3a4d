//! Metadata subsystem.
//!
//! # Data Flow
//! ```text
//! MatchChain
//!     → resolver.rs (static decls + dynamic sources via the pass cache)
//!     → merge root to leaf
//!     → MetadataRecord { title, fields } → document <head>
//! ```

pub mod record;
pub mod resolver;

pub use record::{
    Metadata, MetadataContext, MetadataDecl, MetadataError, MetadataRecord, MetadataResolutionError,
    MetadataSource, TitleDecl, TitleParts,
};
pub use resolver::{merge, MetadataResolver};
