//! Streaming output of a render pass.
//!
//! # Responsibilities
//! - Carry the shell (status, body, head) produced first
//! - Deliver deferred boundary content as separate chunks, in completion order
//! - Own the pass's background work and abort it when dropped
//!
//! # Data Flow
//! ```text
//! RenderPipeline::stream
//!     → RenderStream { status, body (fallbacks in place), head }
//!     → StreamChunk::Boundary { id, view } ... (any order)
//!     → channel closed once every deferred boundary settled
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::metadata::{MetadataRecord, MetadataResolutionError};
use crate::render::fetch::{LevelData, RequestCache, TaskSet};
use crate::render::outcome::{RedirectSignal, RenderError};
use crate::render::view::{escape_into, BoundaryId, View};

/// Overall status of a render pass, fixed once the shell is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderStatus {
    Ok,
    /// A not-found boundary (or the global default) rendered in the shell.
    NotFound,
    Redirect(RedirectSignal),
    /// An error reached the root unhandled.
    Failed(RenderError),
}

impl RenderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RenderStatus::Ok => "ok",
            RenderStatus::NotFound => "not_found",
            RenderStatus::Redirect(_) => "redirect",
            RenderStatus::Failed(_) => "failed",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RenderStatus::Ok => 200,
            RenderStatus::NotFound => 404,
            RenderStatus::Redirect(signal) => signal.kind.status_code(),
            RenderStatus::Failed(_) => 500,
        }
    }
}

/// Content that arrives after the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Boundary { id: BoundaryId, view: View },
    /// A deferred region redirected after the shell was sent.
    Redirect(RedirectSignal),
    /// A deferred region failed and no error slot could take it.
    Failed { id: BoundaryId, error: RenderError },
}

impl StreamChunk {
    /// Wire form appended to a streamed HTML document.
    pub fn to_html(&self) -> String {
        match self {
            StreamChunk::Boundary { id, view } => {
                format!("<template data-boundary=\"B:{}\">{}</template>", id, view.to_html())
            }
            StreamChunk::Redirect(signal) => {
                let mut out = String::from("<meta http-equiv=\"refresh\" content=\"0;url=");
                escape_into(&mut out, &signal.location);
                out.push_str("\">");
                out
            }
            StreamChunk::Failed { id, .. } => {
                format!("<template data-boundary-error=\"B:{}\"></template>", id)
            }
        }
    }
}

/// A fully settled render: what the client router stores and mounts.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPayload {
    pub status: RenderStatus,
    /// `None` for redirects and root failures.
    pub body: Option<View>,
    pub head: Result<MetadataRecord, MetadataResolutionError>,
    /// Settled data per chain level. Only filled by full renders.
    pub data: Vec<LevelData>,
}

impl RenderPayload {
    /// Head to emit; falls back to an empty record when metadata failed.
    pub fn head_or_default(&self) -> MetadataRecord {
        self.head.clone().unwrap_or_default()
    }
}

/// Aborts a pass's background work on drop.
pub(crate) struct PassGuard {
    deferred: Arc<TaskSet>,
    cache: Arc<RequestCache>,
}

impl PassGuard {
    pub(crate) fn new(deferred: Arc<TaskSet>, cache: Arc<RequestCache>) -> Self {
        Self { deferred, cache }
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.deferred.abort_all();
        self.cache.abandon();
    }
}

/// Deferred chunks of a render pass.
pub struct DeferredChunks {
    rx: mpsc::UnboundedReceiver<StreamChunk>,
    _guard: PassGuard,
}

impl DeferredChunks {
    /// Next settled boundary; `None` once every boundary is settled.
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

/// Shell plus the chunks still to come.
pub struct RenderStream {
    pub status: RenderStatus,
    pub body: Option<View>,
    pub head: Result<MetadataRecord, MetadataResolutionError>,
    chunks: DeferredChunks,
}

impl RenderStream {
    pub(crate) fn new(
        status: RenderStatus,
        body: Option<View>,
        head: Result<MetadataRecord, MetadataResolutionError>,
        rx: mpsc::UnboundedReceiver<StreamChunk>,
        guard: PassGuard,
    ) -> Self {
        Self {
            status,
            body,
            head,
            chunks: DeferredChunks { rx, _guard: guard },
        }
    }

    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.chunks.next().await
    }

    /// Separate the shell from the deferred chunks.
    pub fn split(self) -> (RenderPayload, DeferredChunks) {
        let shell = RenderPayload {
            status: self.status,
            body: self.body,
            head: self.head,
            data: Vec::new(),
        };
        (shell, self.chunks)
    }

    /// Wait for every boundary and fold it into the body.
    pub async fn collect(self) -> RenderPayload {
        let (mut payload, mut chunks) = self.split();
        let mut early: Vec<(BoundaryId, View)> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                StreamChunk::Boundary { id, view } => {
                    early.push((id, view));
                    if let Some(body) = payload.body.as_mut() {
                        apply_ready(body, &mut early);
                    }
                }
                StreamChunk::Redirect(signal) => {
                    payload.status = RenderStatus::Redirect(signal);
                    payload.body = None;
                    break;
                }
                StreamChunk::Failed { error, .. } => {
                    payload.status = RenderStatus::Failed(error);
                    payload.body = None;
                    break;
                }
            }
        }
        payload
    }
}

/// Fill every chunk whose boundary is in the body, repeating while nested
/// boundaries become reachable.
fn apply_ready(body: &mut View, early: &mut Vec<(BoundaryId, View)>) {
    loop {
        let before = early.len();
        let mut waiting = Vec::with_capacity(before);
        for (id, view) in early.drain(..) {
            if let Err(view) = body.fill_boundary(id, view) {
                waiting.push((id, view));
            }
        }
        *early = waiting;
        if early.len() == before || early.is_empty() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RenderStatus::Ok.http_status(), 200);
        assert_eq!(RenderStatus::NotFound.http_status(), 404);
        assert_eq!(
            RenderStatus::Redirect(RedirectSignal::permanent("/new")).http_status(),
            308
        );
        assert_eq!(RenderStatus::Failed(RenderError::Cancelled).http_status(), 500);
    }

    #[test]
    fn test_apply_out_of_order() {
        let mut body = View::Suspense {
            id: 0,
            fallback: Box::new(View::empty()),
            content: None,
        };
        let mut early = vec![
            (1, View::text("inner")),
            (
                0,
                View::Suspense {
                    id: 1,
                    fallback: Box::new(View::empty()),
                    content: None,
                },
            ),
        ];
        apply_ready(&mut body, &mut early);
        assert!(early.is_empty());
        assert!(body.pending_boundaries().is_empty());
    }

    #[test]
    fn test_chunk_html() {
        let chunk = StreamChunk::Boundary {
            id: 2,
            view: View::text("done"),
        };
        assert_eq!(chunk.to_html(), "<template data-boundary=\"B:2\">done</template>");
    }

    #[test]
    fn test_redirect_chunk_escapes_location() {
        let chunk = StreamChunk::Redirect(RedirectSignal::temporary("/a?x=1&y=\"><script>"));
        assert_eq!(
            chunk.to_html(),
            "<meta http-equiv=\"refresh\" content=\"0;url=/a?x=1&amp;y=&quot;&gt;&lt;script&gt;\">"
        );
    }
}
