//! The compiled, immutable route tree.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::Write as _;
use thiserror::Error;

use crate::resolve::chain::{ParamValue, Params};
use crate::tree::node::{NodeId, RouteNode, SlotKind};
use crate::tree::segment::{parse_segment, SegmentKind};

/// Characters escaped when a parameter value is written into a path.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Error building a URL from a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HrefError {
    #[error("no route with pattern '{0}'")]
    UnknownRoute(String),
    #[error("missing value for parameter '{0}'")]
    MissingParam(String),
    #[error("parameter '{0}' has the wrong shape for its segment")]
    WrongShape(String),
}

/// A URL-visible route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub pattern: String,
    pub folder: String,
    pub node: NodeId,
    pub slot: SlotKind,
}

/// Arena of route nodes rooted at [`NodeId::ROOT`].
#[derive(Debug, Clone)]
pub struct RouteTree {
    nodes: Vec<RouteNode>,
}

impl RouteTree {
    pub(crate) fn from_nodes(nodes: Vec<RouteNode>) -> Self {
        Self { nodes }
    }

    pub fn root(&self) -> &RouteNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Look up a node. Ids are only ever handed out by this tree.
    pub fn node(&self, id: NodeId) -> &RouteNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&RouteNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RouteNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.root().slots.is_empty()
    }

    /// Find a node by folder path, e.g. `(shop)/blog/[slug]`.
    pub fn find(&self, folder: &str) -> Option<NodeId> {
        let folder = folder.trim_matches('/');
        self.nodes.iter().find(|n| n.folder == folder).map(|n| n.id)
    }

    /// Root-to-node path, inclusive.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.node(parent).parent;
        }
        path.reverse();
        path
    }

    /// True if the node or one of its ancestors is a private folder.
    pub fn is_private(&self, id: NodeId) -> bool {
        self.ancestors(id)
            .into_iter()
            .any(|a| self.node(a).kind == SegmentKind::Private)
    }

    /// URL pattern of a node, e.g. `/blog/[slug]`.
    pub fn pattern_of(&self, id: NodeId) -> String {
        let segments: Vec<&str> = self
            .ancestors(id)
            .into_iter()
            .map(|a| self.node(a).url_segment.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        format!("/{}", segments.join("/"))
    }

    /// Every URL-visible route, in tree order.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.nodes
            .iter()
            .filter(|n| n.routable)
            .filter_map(|n| {
                let slot = if n.has_slot(SlotKind::Page) {
                    SlotKind::Page
                } else if n.has_slot(SlotKind::Handler) {
                    SlotKind::Handler
                } else {
                    return None;
                };
                Some(RouteInfo {
                    pattern: self.pattern_of(n.id),
                    folder: n.folder.clone(),
                    node: n.id,
                    slot,
                })
            })
            .collect()
    }

    /// Build a concrete path from a route pattern and parameter values.
    pub fn href(&self, pattern: &str, params: &Params) -> Result<String, HrefError> {
        if !self.routes().iter().any(|r| r.pattern == pattern) {
            return Err(HrefError::UnknownRoute(pattern.to_string()));
        }

        let mut out = String::new();
        for raw in pattern.split('/').filter(|s| !s.is_empty()) {
            let parsed = parse_segment(raw).map_err(|_| HrefError::UnknownRoute(pattern.to_string()))?;
            let name = parsed.param.unwrap_or_default();
            match (parsed.kind, params.get(&name)) {
                (SegmentKind::Static, _) => push_segment(&mut out, raw),
                (SegmentKind::Dynamic, Some(ParamValue::Single(v))) => push_segment(&mut out, v),
                (SegmentKind::CatchAll, Some(ParamValue::Multi(values))) if !values.is_empty() => {
                    values.iter().for_each(|v| push_segment(&mut out, v))
                }
                (SegmentKind::OptionalCatchAll, Some(ParamValue::Multi(values))) => {
                    values.iter().for_each(|v| push_segment(&mut out, v))
                }
                (SegmentKind::OptionalCatchAll, None) => {}
                (_, None) => return Err(HrefError::MissingParam(name)),
                (_, Some(_)) => return Err(HrefError::WrongShape(name)),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }

    /// Indented, human-readable dump of the tree.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_node(NodeId::ROOT, 0, &mut out);
        out
    }

    fn outline_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let name = if id == NodeId::ROOT { "/" } else { node.name.as_str() };
        let slots: Vec<String> = node.slots.kinds().map(|k| k.to_string()).collect();
        let _ = write!(out, "{}{} ({})", "  ".repeat(depth), name, node.kind);
        if !slots.is_empty() {
            let _ = write!(out, " [{}]", slots.join(", "));
        }
        out.push('\n');
        for child in &node.children {
            self.outline_node(*child, depth + 1, out);
        }
    }
}

fn push_segment(out: &mut String, value: &str) {
    out.push('/');
    out.extend(utf8_percent_encode(value, SEGMENT));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::builder::RouteTreeBuilder;
    use SlotKind::*;

    fn tree() -> RouteTree {
        RouteTreeBuilder::new()
            .slots("", &[Layout, Page])
            .slot("blog/[slug]", Page)
            .slot("docs/[[...path]]", Page)
            .slot("files/[...path]", Page)
            .slot("api/health", Handler)
            .build()
            .unwrap()
    }

    #[test]
    fn test_patterns_and_ancestors() {
        let tree = tree();
        let slug = tree.find("blog/[slug]").unwrap();
        assert_eq!(tree.pattern_of(slug), "/blog/[slug]");
        assert_eq!(tree.ancestors(slug).len(), 3);
        assert_eq!(tree.ancestors(slug)[0], NodeId::ROOT);
    }

    #[test]
    fn test_routes_include_handlers() {
        let routes = tree().routes();
        let health = routes.iter().find(|r| r.pattern == "/api/health").unwrap();
        assert_eq!(health.slot, Handler);
    }

    #[test]
    fn test_href() {
        let tree = tree();
        let mut params = Params::new();
        params.insert("slug".into(), ParamValue::Single("hello world".into()));
        assert_eq!(tree.href("/blog/[slug]", &params).unwrap(), "/blog/hello%20world");

        let mut params = Params::new();
        params.insert("path".into(), ParamValue::Multi(vec!["a".into(), "b".into()]));
        assert_eq!(tree.href("/files/[...path]", &params).unwrap(), "/files/a/b");
        assert_eq!(tree.href("/docs/[[...path]]", &Params::new()).unwrap(), "/docs");

        assert_eq!(
            tree.href("/files/[...path]", &Params::new()),
            Err(HrefError::MissingParam("path".into()))
        );
        assert!(matches!(tree.href("/nope", &Params::new()), Err(HrefError::UnknownRoute(_))));
    }

    #[test]
    fn test_outline_lists_slots() {
        let outline = tree().outline();
        assert!(outline.starts_with("/ (static) [page, layout]"));
        assert!(outline.contains("[slug] (dynamic) [page]"));
    }
}
