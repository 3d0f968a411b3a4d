//! Match chains: the root-to-leaf result of resolving one request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resolve::path::SearchParams;
use crate::tree::{NodeId, RouteTree};

/// A captured parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Dynamic segment: exactly one component.
    Single(String),
    /// Catch-all segment: the captured components in order.
    Multi(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(v) => Some(v),
            ParamValue::Multi(_) => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[String]> {
        match self {
            ParamValue::Single(_) => None,
            ParamValue::Multi(v) => Some(v),
        }
    }
}

pub type Params = BTreeMap<String, ParamValue>;

/// One step of a match chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub node: NodeId,
    /// Parameters captured by this node alone.
    pub params: Params,
}

/// Ordered root-to-leaf sequence of matched nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchChain {
    links: Vec<ChainLink>,
    params: Params,
    search: SearchParams,
    pathname: String,
    pattern: String,
}

impl MatchChain {
    pub(crate) fn new(tree: &RouteTree, links: Vec<ChainLink>, search: SearchParams, pathname: String) -> Self {
        let mut params = Params::new();
        for link in &links {
            // last writer wins
            params.extend(link.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let pattern = links
            .last()
            .map(|l| tree.pattern_of(l.node))
            .unwrap_or_else(|| "/".to_string());

        Self {
            links,
            params,
            search,
            pathname,
            pattern,
        }
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links.iter().map(|l| l.node)
    }

    /// Innermost node of the chain.
    pub fn leaf(&self) -> Option<NodeId> {
        self.links.last().map(|l| l.node)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn search_params(&self) -> &SearchParams {
        &self.search
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// Route pattern of the leaf, e.g. `/blog/[slug]`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Key used by the prefetch store and history entries.
    pub fn cache_key(&self) -> String {
        if self.search.raw().is_empty() {
            self.pathname.clone()
        } else {
            format!("{}?{}", self.pathname, self.search.raw())
        }
    }

    /// Number of leading links shared with `other` (same node, same captures).
    pub fn common_prefix(&self, other: &MatchChain) -> usize {
        self.links
            .iter()
            .zip(other.links.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }
}
