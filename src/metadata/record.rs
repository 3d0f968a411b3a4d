//! Metadata declarations and the resolved record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

use crate::render::fetch::{FetchError, FetchResult, RequestCache};
use crate::resolve::{Params, SearchParams};

/// Placeholder substituted by a title template.
pub const TITLE_PLACEHOLDER: &str = "%s";

/// Structured title declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleParts {
    /// Title for this node and for descendants that declare none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Template applied to descendants' plain titles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Title that ignores every ancestor template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TitleDecl {
    Plain(String),
    Structured(TitleParts),
}

/// Metadata declared by one node.
///
/// Any key other than `title` is a plain field; the leaf-most declaration
/// of a field wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<TitleDecl>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(TitleDecl::Plain(title.into()));
        self
    }

    pub fn title_template(mut self, default: impl Into<String>, template: impl Into<String>) -> Self {
        self.title = Some(TitleDecl::Structured(TitleParts {
            default: Some(default.into()),
            template: Some(template.into()),
            absolute: None,
        }));
        self
    }

    pub fn absolute_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(TitleDecl::Structured(TitleParts {
            absolute: Some(title.into()),
            ..TitleParts::default()
        }));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Fully resolved metadata for one match chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub title: String,
    pub fields: BTreeMap<String, Value>,
}

impl MetadataRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// `<title>` and `<meta>` tags for the document head.
    pub fn to_head_html(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "<title>{}</title>", escape(&self.title));
        for (name, value) in &self.fields {
            let content = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = write!(
                out,
                "<meta name=\"{}\" content=\"{}\">",
                escape(name),
                escape(&content)
            );
        }
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid metadata: {0}")]
    Invalid(String),
}

/// Computing one node's metadata failed.
///
/// Scoped to the document head; the body still renders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("metadata for '{segment}' failed: {source}")]
pub struct MetadataResolutionError {
    pub segment: String,
    #[source]
    pub source: MetadataError,
}

/// What a dynamic metadata function may read.
#[derive(Clone, Copy)]
pub struct MetadataContext<'a> {
    pub params: &'a Params,
    pub search: &'a SearchParams,
    pub cache: &'a RequestCache,
}

impl MetadataContext<'_> {
    /// Fetch through the render pass's request cache.
    pub async fn fetch(&self, resource: &str, params: &Value) -> FetchResult {
        self.cache.fetch(resource, params).await
    }
}

/// Metadata computed from request data.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn metadata(&self, ctx: MetadataContext<'_>) -> Result<Metadata, MetadataError>;
}

/// A node's metadata declaration.
#[derive(Clone)]
pub enum MetadataDecl {
    Static(Metadata),
    Dynamic(Arc<dyn MetadataSource>),
}

impl MetadataDecl {
    pub fn dynamic(source: impl MetadataSource + 'static) -> Self {
        MetadataDecl::Dynamic(Arc::new(source))
    }
}

impl From<Metadata> for MetadataDecl {
    fn from(metadata: Metadata) -> Self {
        MetadataDecl::Static(metadata)
    }
}

impl fmt::Debug for MetadataDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataDecl::Static(m) => f.debug_tuple("Static").field(m).finish(),
            MetadataDecl::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}
