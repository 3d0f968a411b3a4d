//! Route tree nodes and their slots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::http::handler::RouteHandler;
use crate::metadata::MetadataDecl;
use crate::render::fetch::DataDependencies;
use crate::render::view::SlotRenderer;
use crate::tree::segment::SegmentKind;

/// Index of a node in the route tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Named content role a node may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Page,
    Layout,
    Template,
    Loading,
    Error,
    NotFound,
    /// Protocol handler (request in, response out) instead of a page.
    Handler,
}

impl SlotKind {
    pub const ALL: [SlotKind; 7] = [
        SlotKind::Page,
        SlotKind::Layout,
        SlotKind::Template,
        SlotKind::Loading,
        SlotKind::Error,
        SlotKind::NotFound,
        SlotKind::Handler,
    ];

    /// Marker file stem for this slot.
    pub fn file_stem(self) -> &'static str {
        match self {
            SlotKind::Page => "page",
            SlotKind::Layout => "layout",
            SlotKind::Template => "template",
            SlotKind::Loading => "loading",
            SlotKind::Error => "error",
            SlotKind::NotFound => "not-found",
            SlotKind::Handler => "route",
        }
    }

    /// Inverse of [`SlotKind::file_stem`].
    pub fn from_file_stem(stem: &str) -> Option<SlotKind> {
        SlotKind::ALL.into_iter().find(|kind| kind.file_stem() == stem)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Reference to the content behind a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub kind: SlotKind,
    /// Folder path plus file stem, e.g. `blog/[slug]/page`.
    pub source: String,
}

/// The slots present on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots(BTreeMap<SlotKind, SlotRef>);

impl Slots {
    pub fn get(&self, kind: SlotKind) -> Option<&SlotRef> {
        self.0.get(&kind)
    }

    pub fn has(&self, kind: SlotKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub(crate) fn insert(&mut self, slot: SlotRef) {
        self.0.insert(slot.kind, slot);
    }

    pub fn kinds(&self) -> impl Iterator<Item = SlotKind> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when a request can terminate at this node.
    pub fn is_terminal(&self) -> bool {
        self.has(SlotKind::Page) || self.has(SlotKind::Handler)
    }
}

/// Functions attached to a node at build time.
#[derive(Clone, Default)]
pub struct NodeCapabilities {
    /// Data requested before this node renders.
    pub resolve_data: Option<Arc<dyn DataDependencies>>,
    /// Metadata declared by this node.
    pub resolve_metadata: Option<MetadataDecl>,
    /// Per-slot render entry points. Slots without one use the default renderer.
    pub renderers: HashMap<SlotKind, Arc<dyn SlotRenderer>>,
    pub handler: Option<Arc<dyn RouteHandler>>,
}

impl fmt::Debug for NodeCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut renderers: Vec<_> = self.renderers.keys().collect();
        renderers.sort();
        f.debug_struct("NodeCapabilities")
            .field("resolve_data", &self.resolve_data.is_some())
            .field("resolve_metadata", &self.resolve_metadata.is_some())
            .field("renderers", &renderers)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// A child reachable from a node, with the groups crossed to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Nodes entered, outermost group first, candidate last.
    pub path: Vec<NodeId>,
}

impl Candidate {
    pub fn node(&self) -> NodeId {
        // never empty: built from at least the candidate itself
        self.path[self.path.len() - 1]
    }
}

/// Precomputed matching index for one level of the tree.
///
/// Groups are flattened into their parent's index, private folders are absent.
#[derive(Debug, Clone, Default)]
pub struct LevelIndex {
    pub statics: HashMap<String, Vec<Candidate>>,
    pub dynamics: Vec<Candidate>,
    pub catch_alls: Vec<Candidate>,
    /// Ways a path may end at this level without consuming a component
    /// (group pages, optional catch-all pages).
    pub terminals: Vec<Candidate>,
}

/// One file-system segment.
#[derive(Debug, Clone)]
pub struct RouteNode {
    pub id: NodeId,
    pub name: String,
    pub url_segment: String,
    pub kind: SegmentKind,
    pub param: Option<String>,
    pub slots: Slots,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub capabilities: NodeCapabilities,
    /// Folder path from the root, e.g. `(shop)/blog/[slug]`.
    pub folder: String,
    pub(crate) routable: bool,
    pub(crate) index: LevelIndex,
}

impl RouteNode {
    pub fn has_slot(&self, kind: SlotKind) -> bool {
        self.slots.has(kind)
    }

    /// True if this node or any descendant has a page or handler.
    pub fn is_routable(&self) -> bool {
        self.routable
    }

    pub fn renderer(&self, kind: SlotKind) -> Option<&Arc<dyn SlotRenderer>> {
        self.capabilities.renderers.get(&kind)
    }

    pub(crate) fn index(&self) -> &LevelIndex {
        &self.index
    }
}
