//! Control outcomes of rendering a slot.
//!
//! Not-found, error and redirect travel as tagged values through the
//! composition instead of unwinding. Boundaries inspect the tag and either
//! handle it or pass it outward.

use serde::Serialize;
use thiserror::Error;

use crate::metadata::MetadataResolutionError;
use crate::render::fetch::FetchError;
use crate::tree::SlotKind;

/// Redirect status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectKind {
    /// 307
    Temporary,
    /// 308
    Permanent,
}

impl RedirectKind {
    pub fn status_code(self) -> u16 {
        match self {
            RedirectKind::Temporary => 307,
            RedirectKind::Permanent => 308,
        }
    }
}

/// Control signal: abort the render and send the client elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectSignal {
    pub location: String,
    pub kind: RedirectKind,
}

impl RedirectSignal {
    pub fn temporary(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind: RedirectKind::Temporary,
        }
    }

    pub fn permanent(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind: RedirectKind::Permanent,
        }
    }
}

/// Failure raised while producing a slot's content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("data dependency failed: {0}")]
    Data(#[from] FetchError),

    #[error("{slot} at '{segment}' failed: {message}")]
    Slot {
        segment: String,
        slot: SlotKind,
        message: String,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataResolutionError),

    #[error("render pass was cancelled")]
    Cancelled,
}

impl RenderError {
    pub fn slot(segment: impl Into<String>, slot: SlotKind, message: impl Into<String>) -> Self {
        RenderError::Slot {
            segment: segment.into(),
            slot,
            message: message.into(),
        }
    }
}

/// Result of one rendering step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Continue(T),
    NotFound,
    Error(RenderError),
    Redirect(RedirectSignal),
}

impl<T> Outcome<T> {
    pub fn is_continue(&self) -> bool {
        matches!(self, Outcome::Continue(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Continue(v) => Outcome::Continue(f(v)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Redirect(r) => Outcome::Redirect(r),
        }
    }

    /// Re-tag a non-continue outcome for a different payload type.
    ///
    /// Returns the value back on `Continue`.
    pub fn into_signal<U>(self) -> Result<T, Outcome<U>> {
        match self {
            Outcome::Continue(v) => Ok(v),
            Outcome::NotFound => Err(Outcome::NotFound),
            Outcome::Error(e) => Err(Outcome::Error(e)),
            Outcome::Redirect(r) => Err(Outcome::Redirect(r)),
        }
    }
}

impl<T> From<RenderError> for Outcome<T> {
    fn from(err: RenderError) -> Self {
        Outcome::Error(err)
    }
}

impl<T> From<RedirectSignal> for Outcome<T> {
    fn from(signal: RedirectSignal) -> Self {
        Outcome::Redirect(signal)
    }
}
