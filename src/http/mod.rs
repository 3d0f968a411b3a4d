//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, target extraction)
//!     → SegmentResolver (match chain | not found)
//!     → handler.rs (protocol handler) | RenderPipeline (streamed page)
//!     → response.rs (status, headers, streamed HTML)
//!     → Send to client
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{HandlerRequest, HandlerResponse, RouteHandler};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppServer, AppState};
