//! Segment resolution.
//!
//! # Responsibilities
//! - Match a normalized request path against the route tree
//! - Capture dynamic and catch-all parameters into a [`MatchChain`]
//! - Report the deepest point reached when nothing matches
//! - Locate the not-found boundary for a failed or aborted match
//!
//! # Design Decisions
//! - Precedence at every level: static, then dynamic, then catch-all
//! - Lower-precedence siblings are tried when a higher one fails deeper,
//!   so the first full match in precedence order always wins
//! - Groups are entered transparently; private folders are never indexed

use thiserror::Error;

use crate::resolve::chain::{ChainLink, MatchChain, ParamValue, Params};
use crate::resolve::path::RequestPath;
use crate::tree::node::Candidate;
use crate::tree::{NodeId, RouteTree, SegmentKind, SlotKind};

/// No route matches the request path.
///
/// Recoverable: the pipeline renders the nearest not-found slot along
/// `attempted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route matches '{path}'")]
pub struct RouteNotFoundError {
    pub path: String,
    /// Deepest partial chain the resolver reached, root first.
    pub attempted: MatchChain,
}

impl RouteNotFoundError {
    /// Node where descent stopped.
    pub fn failure_point(&self) -> NodeId {
        self.attempted.leaf().unwrap_or(NodeId::ROOT)
    }
}

/// Resolves request paths against one tree.
#[derive(Debug, Clone, Copy)]
pub struct SegmentResolver<'t> {
    tree: &'t RouteTree,
}

struct Descent<'p> {
    rest: &'p [String],
    trail: Vec<ChainLink>,
    deepest: Vec<ChainLink>,
}

impl<'t> SegmentResolver<'t> {
    pub fn new(tree: &'t RouteTree) -> Self {
        Self { tree }
    }

    pub fn resolve(&self, path: &RequestPath) -> Result<MatchChain, RouteNotFoundError> {
        let mut descent = Descent {
            rest: path.components(),
            trail: vec![ChainLink {
                node: NodeId::ROOT,
                params: Params::new(),
            }],
            deepest: Vec::new(),
        };

        let matched = self.descend(NodeId::ROOT, 0, &mut descent);
        let search = path.search_params().clone();
        if matched {
            let chain = MatchChain::new(self.tree, descent.trail, search, path.pathname());
            tracing::debug!(
                path = %chain.pathname(),
                route = %chain.pattern(),
                depth = chain.len(),
                "Route resolved"
            );
            Ok(chain)
        } else {
            let attempted = MatchChain::new(self.tree, descent.deepest, search, path.pathname());
            tracing::debug!(
                path = %path.pathname(),
                failure_point = %self.tree.pattern_of(attempted.leaf().unwrap_or(NodeId::ROOT)),
                "No route matched"
            );
            Err(RouteNotFoundError {
                path: path.pathname(),
                attempted,
            })
        }
    }

    /// Nearest node on `chain` (walking up from its leaf) with a not-found slot.
    ///
    /// `None` means the global default applies.
    pub fn not_found_boundary(&self, chain: &MatchChain) -> Option<NodeId> {
        chain
            .links()
            .iter()
            .rev()
            .map(|link| link.node)
            .find(|id| self.tree.node(*id).has_slot(SlotKind::NotFound))
    }

    fn descend(&self, at: NodeId, consumed: usize, d: &mut Descent<'_>) -> bool {
        if d.trail.len() > d.deepest.len() {
            d.deepest = d.trail.clone();
        }

        let node = self.tree.node(at);
        let index = node.index();
        let all = d.rest;
        let rest = &all[consumed..];

        let Some(head) = rest.first() else {
            if node.slots.is_terminal() {
                return true;
            }
            // Group pages and empty optional catch-alls end here too.
            for candidate in &index.terminals {
                let capture = ParamValue::Multi(Vec::new());
                let pushed = self.enter(candidate, Some(capture), d);
                if self.tree.node(candidate.node()).slots.is_terminal() {
                    return true;
                }
                d.trail.truncate(d.trail.len() - pushed);
            }
            return false;
        };

        if let Some(list) = index.statics.get(head) {
            for candidate in list {
                let pushed = self.enter(candidate, None, d);
                if self.descend(candidate.node(), consumed + 1, d) {
                    return true;
                }
                d.trail.truncate(d.trail.len() - pushed);
            }
        }

        for candidate in &index.dynamics {
            let pushed = self.enter(candidate, Some(ParamValue::Single(head.clone())), d);
            if self.descend(candidate.node(), consumed + 1, d) {
                return true;
            }
            d.trail.truncate(d.trail.len() - pushed);
        }

        for candidate in &index.catch_alls {
            let pushed = self.enter(candidate, Some(ParamValue::Multi(rest.to_vec())), d);
            if d.trail.len() > d.deepest.len() {
                d.deepest = d.trail.clone();
            }
            if self.tree.node(candidate.node()).slots.is_terminal() {
                return true;
            }
            d.trail.truncate(d.trail.len() - pushed);
        }

        false
    }

    /// Push the candidate's group path onto the trail; returns links pushed.
    fn enter(&self, candidate: &Candidate, capture: Option<ParamValue>, d: &mut Descent<'_>) -> usize {
        for id in &candidate.path {
            let node = self.tree.node(*id);
            let mut params = Params::new();
            if let (Some(name), Some(value)) = (&node.param, &capture) {
                if node.kind != SegmentKind::Group {
                    params.insert(name.clone(), value.clone());
                }
            }
            d.trail.push(ChainLink { node: *id, params });
        }
        candidate.path.len()
    }
}
