//! Folder-name conventions.
//!
//! # Responsibilities
//! - Classify a raw folder name into a segment kind
//! - Derive the URL segment a folder contributes
//! - Extract the parameter name of dynamic and catch-all folders
//!
//! # Conventions
//! ```text
//! about          → Static            url "about"
//! (marketing)    → Group             url ""
//! _components    → Private           url ""
//! [slug]         → Dynamic           url "[slug]"
//! [...parts]     → CatchAll          url "[...parts]"
//! [[...parts]]   → OptionalCatchAll  url "[[...parts]]"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix marking a folder as private (non-routable, co-located content).
pub const PRIVATE_MARKER: char = '_';

/// Error for folder names that do not follow the conventions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid segment name '{name}': {reason}")]
pub struct SegmentError {
    pub name: String,
    pub reason: &'static str,
}

impl SegmentError {
    fn new(name: &str, reason: &'static str) -> Self {
        Self {
            name: name.to_string(),
            reason,
        }
    }
}

/// The kind of a route segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Static,
    Dynamic,
    CatchAll,
    OptionalCatchAll,
    Group,
    Private,
}

/// Sibling class used for ambiguity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchClass {
    Static,
    Dynamic,
    CatchAll,
}

impl SegmentKind {
    /// Class this kind competes in among siblings, `None` for transparent kinds.
    pub fn match_class(self) -> Option<MatchClass> {
        match self {
            SegmentKind::Static => Some(MatchClass::Static),
            SegmentKind::Dynamic => Some(MatchClass::Dynamic),
            SegmentKind::CatchAll | SegmentKind::OptionalCatchAll => Some(MatchClass::CatchAll),
            SegmentKind::Group | SegmentKind::Private => None,
        }
    }

    /// True for kinds that capture a parameter.
    pub fn is_param(self) -> bool {
        matches!(
            self,
            SegmentKind::Dynamic | SegmentKind::CatchAll | SegmentKind::OptionalCatchAll
        )
    }

    pub fn is_catch_all(self) -> bool {
        matches!(self, SegmentKind::CatchAll | SegmentKind::OptionalCatchAll)
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegmentKind::Static => "static",
            SegmentKind::Dynamic => "dynamic",
            SegmentKind::CatchAll => "catch-all",
            SegmentKind::OptionalCatchAll => "optional catch-all",
            SegmentKind::Group => "group",
            SegmentKind::Private => "private",
        };
        f.write_str(s)
    }
}

/// Result of classifying one folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSegment {
    pub kind: SegmentKind,
    pub url_segment: String,
    pub param: Option<String>,
}

/// Classify a folder name.
pub fn parse_segment(name: &str) -> Result<ParsedSegment, SegmentError> {
    if name.is_empty() {
        return Err(SegmentError::new(name, "empty folder name"));
    }
    if name.contains('/') {
        return Err(SegmentError::new(name, "folder names cannot contain '/'"));
    }

    if name.starts_with('(') && name.ends_with(')') {
        if name.len() <= 2 {
            return Err(SegmentError::new(name, "group name cannot be empty"));
        }
        return Ok(ParsedSegment {
            kind: SegmentKind::Group,
            url_segment: String::new(),
            param: None,
        });
    }

    if name.starts_with(PRIVATE_MARKER) {
        return Ok(ParsedSegment {
            kind: SegmentKind::Private,
            url_segment: String::new(),
            param: None,
        });
    }

    let (kind, inner) = if let Some(inner) = name
        .strip_prefix("[[...")
        .and_then(|rest| rest.strip_suffix("]]"))
    {
        (SegmentKind::OptionalCatchAll, inner)
    } else if let Some(inner) = name
        .strip_prefix("[...")
        .and_then(|rest| rest.strip_suffix(']'))
    {
        (SegmentKind::CatchAll, inner)
    } else if let Some(inner) = name.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        (SegmentKind::Dynamic, inner)
    } else {
        if name.contains(['[', ']', '(', ')']) {
            return Err(SegmentError::new(name, "unbalanced brackets or parentheses"));
        }
        return Ok(ParsedSegment {
            kind: SegmentKind::Static,
            url_segment: name.to_string(),
            param: None,
        });
    };

    validate_param(name, inner)?;
    Ok(ParsedSegment {
        kind,
        url_segment: name.to_string(),
        param: Some(inner.to_string()),
    })
}

fn validate_param(name: &str, param: &str) -> Result<(), SegmentError> {
    if param.is_empty() {
        return Err(SegmentError::new(name, "parameter name cannot be empty"));
    }
    if param.starts_with('.') {
        return Err(SegmentError::new(name, "spread marker must be exactly '...'"));
    }
    if !param.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(SegmentError::new(name, "parameter name has invalid characters"));
    }
    Ok(())
}
