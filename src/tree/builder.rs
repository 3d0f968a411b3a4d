//! Route tree compilation.
//!
//! # Responsibilities
//! - Turn folder paths and slot markers into an arena of [`RouteNode`]s
//! - Attach capability records (data, metadata, renderers, handlers)
//! - Precompute each level's matching index (groups flattened, private skipped)
//! - Reject ambiguous or malformed trees before any request is served
//!
//! # Design Decisions
//! - Compiled once, immutable afterwards
//! - Folder order never affects matching: precedence lives in the index
//! - At most one static folder per segment, one dynamic folder and one
//!   catch-all folder per level, whatever slots they carry

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::http::handler::RouteHandler;
use crate::metadata::MetadataDecl;
use crate::render::fetch::DataDependencies;
use crate::render::view::SlotRenderer;
use crate::tree::node::{
    Candidate, LevelIndex, NodeCapabilities, NodeId, RouteNode, SlotKind, SlotRef, Slots,
};
use crate::tree::route_tree::RouteTree;
use crate::tree::segment::{parse_segment, SegmentError, SegmentKind};

/// Two siblings of the same matching class would match the same URL shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ambiguous routes under '{parent}': '{first}' and '{second}' {reason}")]
pub struct AmbiguousRouteError {
    /// URL pattern of the level where the conflict was found.
    pub parent: String,
    pub first: String,
    pub second: String,
    pub reason: String,
}

/// Errors that abort tree compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeBuildError {
    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Ambiguous(#[from] AmbiguousRouteError),

    #[error("parameter '{param}' is captured twice along '{folder}'")]
    DuplicateParam { param: String, folder: String },

    #[error("catch-all folder '{folder}' cannot contain routable children")]
    CatchAllNotTerminal { folder: String },
}

#[derive(Default)]
struct FolderDecl {
    slots: BTreeSet<SlotKind>,
    capabilities: NodeCapabilities,
}

/// Builder for a [`RouteTree`].
///
/// Folder paths are relative to the application root and use `/` separators;
/// the empty path is the root itself.
#[derive(Default)]
pub struct RouteTreeBuilder {
    folders: BTreeMap<String, FolderDecl>,
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl RouteTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn folder_decl(&mut self, path: &str) -> &mut FolderDecl {
        self.folders.entry(normalize(path)).or_default()
    }

    /// Declare a folder without slots (kept for layout inheritance).
    pub fn folder(mut self, path: &str) -> Self {
        self.folder_decl(path);
        self
    }

    pub fn slot(mut self, path: &str, kind: SlotKind) -> Self {
        self.folder_decl(path).slots.insert(kind);
        self
    }

    pub fn slots(mut self, path: &str, kinds: &[SlotKind]) -> Self {
        self.folder_decl(path).slots.extend(kinds.iter().copied());
        self
    }

    /// Attach a render entry point; declares the slot as well.
    pub fn render(mut self, path: &str, kind: SlotKind, renderer: impl SlotRenderer + 'static) -> Self {
        let decl = self.folder_decl(path);
        decl.slots.insert(kind);
        decl.capabilities.renderers.insert(kind, Arc::new(renderer));
        self
    }

    pub fn data(mut self, path: &str, deps: impl DataDependencies + 'static) -> Self {
        self.folder_decl(path).capabilities.resolve_data = Some(Arc::new(deps));
        self
    }

    pub fn metadata(mut self, path: &str, decl: impl Into<MetadataDecl>) -> Self {
        self.folder_decl(path).capabilities.resolve_metadata = Some(decl.into());
        self
    }

    /// Attach a protocol handler; declares the handler slot.
    pub fn handler(mut self, path: &str, handler: impl RouteHandler + 'static) -> Self {
        let decl = self.folder_decl(path);
        decl.slots.insert(SlotKind::Handler);
        decl.capabilities.handler = Some(Arc::new(handler));
        self
    }

    /// Compile and validate the tree.
    pub fn build(self) -> Result<RouteTree, TreeBuildError> {
        let mut nodes = vec![RouteNode {
            id: NodeId::ROOT,
            name: String::new(),
            url_segment: String::new(),
            kind: SegmentKind::Static,
            param: None,
            slots: Slots::default(),
            children: Vec::new(),
            parent: None,
            capabilities: NodeCapabilities::default(),
            folder: String::new(),
            routable: false,
            index: LevelIndex::default(),
        }];
        let mut by_folder: HashMap<String, NodeId> = HashMap::from([(String::new(), NodeId::ROOT)]);

        for (folder, decl) in self.folders {
            let id = ensure_folder(&mut nodes, &mut by_folder, &folder)?;
            let node = &mut nodes[id.0];
            for kind in decl.slots {
                let source = if folder.is_empty() {
                    kind.file_stem().to_string()
                } else {
                    format!("{}/{}", folder, kind.file_stem())
                };
                node.slots.insert(SlotRef { kind, source });
            }
            node.capabilities = decl.capabilities;
        }

        // Children always have larger ids than their parent.
        let mut hidden = vec![false; nodes.len()];
        for i in 0..nodes.len() {
            hidden[i] = nodes[i].kind == SegmentKind::Private
                || nodes[i].parent.is_some_and(|p| hidden[p.0]);
        }
        for i in (0..nodes.len()).rev() {
            let routable = !hidden[i]
                && (nodes[i].slots.is_terminal()
                    || nodes[i].children.iter().any(|c| nodes[c.0].routable));
            nodes[i].routable = routable;
        }

        for i in 0..nodes.len() {
            if matches!(nodes[i].kind, SegmentKind::Group | SegmentKind::Private) {
                continue;
            }
            let mut index = LevelIndex::default();
            let mut via = Vec::new();
            collect_candidates(&nodes, NodeId(i), &mut via, &mut index);
            nodes[i].index = index;
        }

        let tree = RouteTree::from_nodes(nodes);
        validate(&tree)?;

        tracing::info!(
            nodes = tree.len(),
            routes = tree.routes().len(),
            "Route tree built"
        );
        Ok(tree)
    }
}

fn ensure_folder(
    nodes: &mut Vec<RouteNode>,
    by_folder: &mut HashMap<String, NodeId>,
    folder: &str,
) -> Result<NodeId, TreeBuildError> {
    let mut current = NodeId::ROOT;
    let mut prefix = String::new();
    for name in folder.split('/').filter(|c| !c.is_empty()) {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(name);

        if let Some(id) = by_folder.get(&prefix) {
            current = *id;
            continue;
        }

        let parsed = parse_segment(name)?;
        let id = NodeId(nodes.len());
        nodes.push(RouteNode {
            id,
            name: name.to_string(),
            url_segment: parsed.url_segment,
            kind: parsed.kind,
            param: parsed.param,
            slots: Slots::default(),
            children: Vec::new(),
            parent: Some(current),
            capabilities: NodeCapabilities::default(),
            folder: prefix.clone(),
            routable: false,
            index: LevelIndex::default(),
        });
        nodes[current.0].children.push(id);
        by_folder.insert(prefix.clone(), id);
        current = id;
    }
    Ok(current)
}

fn collect_candidates(nodes: &[RouteNode], parent: NodeId, via: &mut Vec<NodeId>, index: &mut LevelIndex) {
    for &child in &nodes[parent.0].children {
        let node = &nodes[child.0];
        via.push(child);
        let candidate = Candidate { path: via.clone() };
        match node.kind {
            SegmentKind::Private => {}
            SegmentKind::Group => {
                if node.slots.is_terminal() {
                    index.terminals.push(candidate);
                }
                collect_candidates(nodes, child, via, index);
            }
            SegmentKind::Static => {
                index
                    .statics
                    .entry(node.url_segment.clone())
                    .or_default()
                    .push(candidate);
            }
            SegmentKind::Dynamic => index.dynamics.push(candidate),
            SegmentKind::CatchAll => index.catch_alls.push(candidate),
            SegmentKind::OptionalCatchAll => {
                if node.slots.is_terminal() {
                    index.terminals.push(candidate.clone());
                }
                index.catch_alls.push(candidate);
            }
        }
        via.pop();
    }
}

fn validate(tree: &RouteTree) -> Result<(), TreeBuildError> {
    for node in tree.nodes() {
        if node.kind == SegmentKind::Private || tree.is_private(node.id) {
            continue;
        }

        if node.has_slot(SlotKind::Page) && node.has_slot(SlotKind::Handler) {
            return Err(AmbiguousRouteError {
                parent: tree.pattern_of(node.id),
                first: format!("{}/page", node.folder),
                second: format!("{}/route", node.folder),
                reason: "cannot both answer the same URL".to_string(),
            }
            .into());
        }

        if node.kind.is_catch_all() && node.children.iter().any(|c| tree.node(*c).routable) {
            return Err(TreeBuildError::CatchAllNotTerminal {
                folder: node.folder.clone(),
            });
        }

        if let Some(param) = &node.param {
            let mut ancestor = node.parent;
            while let Some(id) = ancestor {
                let up = tree.node(id);
                if up.param.as_deref() == Some(param.as_str()) {
                    return Err(TreeBuildError::DuplicateParam {
                        param: param.clone(),
                        folder: node.folder.clone(),
                    });
                }
                ancestor = up.parent;
            }
        }

        if node.kind == SegmentKind::Group {
            continue;
        }

        let index = node.index();
        let parent = tree.pattern_of(node.id);
        let siblings = |list: &[Candidate]| -> Vec<NodeId> { list.iter().map(Candidate::node).collect() };

        let mut statics: Vec<_> = index.statics.iter().collect();
        statics.sort_by(|a, b| a.0.cmp(b.0));
        for (segment, list) in statics {
            let found = siblings(list);
            if found.len() > 1 {
                return Err(conflict(tree, &parent, found[0], found[1], format!("both match '{}'", segment)));
            }
        }

        let dynamics = siblings(&index.dynamics);
        if dynamics.len() > 1 {
            return Err(conflict(tree, &parent, dynamics[0], dynamics[1], "are both dynamic segments".to_string()));
        }

        let catch_alls = siblings(&index.catch_alls);
        if catch_alls.len() > 1 {
            return Err(conflict(tree, &parent, catch_alls[0], catch_alls[1], "are both catch-all segments".to_string()));
        }

        let mut endings: Vec<NodeId> = index.terminals.iter().map(Candidate::node).collect();
        if node.slots.is_terminal() {
            endings.insert(0, node.id);
        }
        if endings.len() > 1 {
            return Err(conflict(tree, &parent, endings[0], endings[1], format!("both resolve '{}'", parent)));
        }
    }
    Ok(())
}

fn conflict(tree: &RouteTree, parent: &str, first: NodeId, second: NodeId, reason: String) -> TreeBuildError {
    let folder = |id: NodeId| {
        let f = &tree.node(id).folder;
        if f.is_empty() { "/".to_string() } else { f.clone() }
    };
    AmbiguousRouteError {
        parent: parent.to_string(),
        first: folder(first),
        second: folder(second),
        reason,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use SlotKind::*;

    #[test]
    fn test_groups_and_private_folders() {
        let tree = RouteTreeBuilder::new()
            .slots("", &[Layout, Page])
            .slots("(marketing)", &[Layout])
            .slots("(marketing)/about", &[Page])
            .slots("_components/button", &[Page])
            .build()
            .unwrap();

        let group = tree.find("(marketing)").unwrap();
        assert_eq!(tree.node(group).kind, SegmentKind::Group);
        assert!(tree.node(group).url_segment.is_empty());

        let private = tree.find("_components").unwrap();
        assert!(!tree.node(private).is_routable());

        let patterns: Vec<_> = tree.routes().into_iter().map(|r| r.pattern).collect();
        assert_eq!(patterns, vec!["/".to_string(), "/about".to_string()]);
    }

    #[test]
    fn test_layout_only_folder_is_kept_but_not_routable() {
        let tree = RouteTreeBuilder::new()
            .slots("settings", &[Layout, NotFound])
            .slots("dashboard", &[Page])
            .build()
            .unwrap();

        let settings = tree.find("settings").unwrap();
        assert!(!tree.node(settings).is_routable());
        assert!(tree.node(tree.find("dashboard").unwrap()).is_routable());
    }

    #[test]
    fn test_two_dynamic_siblings_are_ambiguous() {
        let err = RouteTreeBuilder::new()
            .slot("blog/[slug]", Page)
            .slot("blog/[id]", Page)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::Ambiguous(_)));
    }

    #[test]
    fn test_two_catch_all_siblings_are_ambiguous() {
        let err = RouteTreeBuilder::new()
            .slot("docs/[...path]", Page)
            .slot("docs/[[...rest]]", Page)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::Ambiguous(_)));
    }

    #[test]
    fn test_same_static_through_groups_is_ambiguous() {
        let err = RouteTreeBuilder::new()
            .slot("(a)/about", Page)
            .slot("(b)/about", Page)
            .build()
            .unwrap_err();
        match err {
            TreeBuildError::Ambiguous(e) => {
                assert_eq!(e.first, "(a)/about");
                assert_eq!(e.second, "(b)/about");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_layout_only_duplicate_static_is_ambiguous() {
        let err = RouteTreeBuilder::new()
            .slot("(a)/shop", Layout)
            .slot("(b)/shop", Page)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::Ambiguous(_)));
    }

    #[test]
    fn test_layout_only_dynamic_sibling_is_ambiguous() {
        let err = RouteTreeBuilder::new()
            .slot("blog/[slug]", Page)
            .slot("blog/[id]", Layout)
            .build()
            .unwrap_err();
        match err {
            TreeBuildError::Ambiguous(e) => assert_eq!(e.reason, "are both dynamic segments"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = RouteTreeBuilder::new()
            .slot("docs/[...path]", Layout)
            .slot("docs/[[...rest]]", Loading)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::Ambiguous(_)));
    }

    #[test]
    fn test_optional_catch_all_conflicts_with_parent_page() {
        let err = RouteTreeBuilder::new()
            .slot("shop", Page)
            .slot("shop/[[...filters]]", Page)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::Ambiguous(_)));
    }

    #[test]
    fn test_dynamic_and_catch_all_siblings_coexist() {
        let tree = RouteTreeBuilder::new()
            .slot("blog/[slug]", Page)
            .slot("blog/[...rest]", Page)
            .slot("blog/latest", Page)
            .build();
        assert!(tree.is_ok());
    }

    #[test]
    fn test_page_and_handler_conflict() {
        let err = RouteTreeBuilder::new()
            .slots("api", &[Page, Handler])
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::Ambiguous(_)));
    }

    #[test]
    fn test_duplicate_param_and_catch_all_children() {
        let err = RouteTreeBuilder::new()
            .slot("[id]/items/[id]", Page)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::DuplicateParam { .. }));

        let err = RouteTreeBuilder::new()
            .slot("docs/[...path]/edit", Page)
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeBuildError::CatchAllNotTerminal { .. }));
    }

    #[test]
    fn test_invalid_folder_name() {
        let err = RouteTreeBuilder::new().slot("blog/[slug", Page).build().unwrap_err();
        assert!(matches!(err, TreeBuildError::Segment(_)));
    }
}
