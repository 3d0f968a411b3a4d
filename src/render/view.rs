//! Rendered views and the slot-renderer seam.
//!
//! # Responsibilities
//! - Model the composed output: elements, slot frames, suspense boundaries
//! - Serialize a view to HTML for the transport
//! - Define [`SlotRenderer`], the hook into the UI component engine
//! - Provide default content for slots that register no renderer
//!
//! # Design Decisions
//! - Every mounted slot instance is wrapped in a [`View::Frame`] carrying
//!   its [`InstanceKey`]; the client router diffs frames, not elements
//! - Boundaries are addressed by the chain depth of the node that owns
//!   the loading slot, which is unique within one composition

use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::render::identity::InstanceKey;
use crate::render::outcome::{Outcome, RenderError};
use crate::resolve::{Params, SearchParams};
use crate::tree::{RouteNode, SlotKind};

/// Suspense boundary address within one composition.
pub type BoundaryId = usize;

/// Composed output of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Text(String),
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<View>,
    },
    /// A mounted slot instance.
    Frame { key: InstanceKey, child: Box<View> },
    Suspense {
        id: BoundaryId,
        fallback: Box<View>,
        /// `None` while the content is still streaming.
        content: Option<Box<View>>,
    },
    Fragment(Vec<View>),
}

impl View {
    pub fn empty() -> View {
        View::Fragment(Vec::new())
    }

    pub fn text(text: impl Into<String>) -> View {
        View::Text(text.into())
    }

    pub fn element(tag: impl Into<String>, children: Vec<View>) -> View {
        View::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children,
        }
    }

    /// Add an attribute; no-op on anything but an element.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> View {
        if let View::Element { attrs, .. } = &mut self {
            attrs.push((name.into(), value.into()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, View::Fragment(children) if children.is_empty())
    }

    /// Serialize to HTML. Pending boundaries render their fallback.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            View::Text(text) => escape_into(out, text),
            View::Element {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    let _ = write!(out, " {}=\"", name);
                    escape_into(out, value);
                    out.push('"');
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{}>", tag);
            }
            View::Frame { child, .. } => child.write_html(out),
            View::Suspense {
                id,
                fallback,
                content,
            } => match content {
                Some(content) => {
                    out.push_str("<!--$-->");
                    content.write_html(out);
                    out.push_str("<!--/$-->");
                }
                None => {
                    let _ = write!(out, "<!--$?--><template id=\"B:{}\"></template>", id);
                    fallback.write_html(out);
                    out.push_str("<!--/$-->");
                }
            },
            View::Fragment(children) => {
                for child in children {
                    child.write_html(out);
                }
            }
        }
    }

    /// Fill the pending boundary `id` with `content`.
    ///
    /// Hands `content` back if no pending boundary with that id is present (yet).
    pub fn fill_boundary(&mut self, id: BoundaryId, content: View) -> Result<(), View> {
        let mut slot = Some(content);
        self.fill(id, &mut slot);
        match slot {
            Some(content) => Err(content),
            None => Ok(()),
        }
    }

    fn fill(&mut self, target: BoundaryId, slot: &mut Option<View>) {
        if slot.is_none() {
            return;
        }
        match self {
            View::Suspense { id, content, .. } => {
                if let Some(inner) = content {
                    inner.fill(target, slot);
                } else if *id == target {
                    *content = slot.take().map(Box::new);
                }
            }
            View::Element { children, .. } | View::Fragment(children) => {
                for child in children {
                    child.fill(target, slot);
                }
            }
            View::Frame { child, .. } => child.fill(target, slot),
            View::Text(_) => {}
        }
    }

    /// Ids of boundaries whose content has not arrived.
    pub fn pending_boundaries(&self) -> Vec<BoundaryId> {
        let mut out = Vec::new();
        self.collect_pending(&mut out);
        out
    }

    fn collect_pending(&self, out: &mut Vec<BoundaryId>) {
        match self {
            View::Suspense { id, content, .. } => match content {
                Some(inner) => inner.collect_pending(out),
                None => out.push(*id),
            },
            View::Element { children, .. } | View::Fragment(children) => {
                children.iter().for_each(|c| c.collect_pending(out));
            }
            View::Frame { child, .. } => child.collect_pending(out),
            View::Text(_) => {}
        }
    }

    /// Visit every frame with the key of its nearest enclosing frame.
    pub fn visit_frames(&self, f: &mut impl FnMut(&InstanceKey, Option<&InstanceKey>)) {
        self.walk_frames(None, f);
    }

    fn walk_frames(&self, parent: Option<&InstanceKey>, f: &mut impl FnMut(&InstanceKey, Option<&InstanceKey>)) {
        match self {
            View::Frame { key, child } => {
                f(key, parent);
                child.walk_frames(Some(key), f);
            }
            View::Element { children, .. } | View::Fragment(children) => {
                children.iter().for_each(|c| c.walk_frames(parent, f));
            }
            View::Suspense { content, fallback, .. } => match content {
                Some(inner) => inner.walk_frames(parent, f),
                None => fallback.walk_frames(parent, f),
            },
            View::Text(_) => {}
        }
    }

    /// Re-key template frames for navigation `navigation`.
    ///
    /// Used when a payload rendered ahead of time (prefetch) is committed
    /// by a later navigation.
    pub fn restamp_templates(&mut self, navigation: u64) {
        match self {
            View::Frame { key, child } => {
                if key.navigation.is_some() {
                    *key = key.for_navigation(navigation);
                }
                child.restamp_templates(navigation);
            }
            View::Element { children, .. } | View::Fragment(children) => {
                children.iter_mut().for_each(|c| c.restamp_templates(navigation));
            }
            View::Suspense {
                content, fallback, ..
            } => {
                fallback.restamp_templates(navigation);
                if let Some(inner) = content {
                    inner.restamp_templates(navigation);
                }
            }
            View::Text(_) => {}
        }
    }
}

/// Append `text` with HTML special characters escaped.
pub(crate) fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

/// Everything a slot renderer may read.
#[derive(Debug, Clone, Copy)]
pub struct SlotContext<'a> {
    pub slot: SlotKind,
    pub node: &'a RouteNode,
    /// Parameters captured from the root down to this node.
    pub params: &'a Params,
    pub search: &'a SearchParams,
    /// Resolved data for this node, in request order.
    pub data: &'a [Arc<Value>],
    /// The caught error, for `error` slots.
    pub error: Option<&'a RenderError>,
}

impl SlotContext<'_> {
    pub fn data(&self, index: usize) -> Option<&Value> {
        self.data.get(index).map(|v| v.as_ref())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }
}

/// Renders one slot around its already-composed children.
pub trait SlotRenderer: Send + Sync {
    fn render(&self, ctx: &SlotContext<'_>, children: View) -> Outcome<View>;
}

impl<F> SlotRenderer for F
where
    F: Fn(&SlotContext<'_>, View) -> Outcome<View> + Send + Sync,
{
    fn render(&self, ctx: &SlotContext<'_>, children: View) -> Outcome<View> {
        self(ctx, children)
    }
}

/// Content used when a slot has no registered renderer.
pub fn default_view(ctx: &SlotContext<'_>, children: View) -> View {
    let folder = ctx.node.folder.clone();
    match ctx.slot {
        SlotKind::Layout | SlotKind::Template => {
            View::element("div", vec![children]).attr(format!("data-{}", ctx.slot), folder)
        }
        SlotKind::Page => View::element("main", vec![View::text(folder.clone())]).attr("data-page", folder),
        SlotKind::Loading => View::element("p", vec![View::text("Loading...")]).attr("data-loading", folder),
        SlotKind::Error => {
            let message = ctx
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Something went wrong".to_string());
            View::element("div", vec![View::text(message)]).attr("role", "alert")
        }
        SlotKind::NotFound => not_found_view(),
        SlotKind::Handler => children,
    }
}

/// Global default not-found content.
pub fn not_found_view() -> View {
    View::Fragment(vec![
        View::element("h1", vec![View::text("404")]),
        View::element("p", vec![View::text("This page could not be found.")]),
    ])
}
