//! Instance identity for mounted slots.
//!
//! A mounted instance survives a navigation only if the new composition
//! produces the same key at the same place.

use serde::Serialize;
use std::fmt;

use crate::tree::{NodeId, SlotKind};

/// Identity of one mounted slot instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceKey {
    pub slot: SlotKind,
    pub node: NodeId,
    /// Position of `node` in the match chain.
    pub depth: usize,
    /// Navigation sequence number; set for templates only.
    pub navigation: Option<u64>,
}

impl InstanceKey {
    /// Key for a slot of `node` at `depth` during navigation `navigation`.
    ///
    /// Layouts and every other persistent slot are keyed by position alone;
    /// templates additionally carry the navigation sequence number.
    pub fn new(slot: SlotKind, node: NodeId, depth: usize, navigation: u64) -> Self {
        Self {
            slot,
            node,
            depth,
            navigation: (slot == SlotKind::Template).then_some(navigation),
        }
    }

    /// Same key, re-stamped for another navigation.
    pub fn for_navigation(self, navigation: u64) -> Self {
        Self::new(self.slot, self.node, self.depth, navigation)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.navigation {
            Some(seq) => write!(f, "{}:{}@{}#{}", self.slot, self.node, self.depth, seq),
            None => write!(f, "{}:{}@{}", self.slot, self.node, self.depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_key_ignores_navigation() {
        let a = InstanceKey::new(SlotKind::Layout, NodeId(2), 1, 7);
        let b = InstanceKey::new(SlotKind::Layout, NodeId(2), 1, 8);
        assert_eq!(a, b);
        assert_ne!(a, InstanceKey::new(SlotKind::Layout, NodeId(2), 2, 7));
    }

    #[test]
    fn test_template_key_changes_per_navigation() {
        let a = InstanceKey::new(SlotKind::Template, NodeId(2), 1, 7);
        assert_ne!(a, a.for_navigation(8));
        assert_eq!(a.to_string(), "template:n2@1#7");
    }
}
