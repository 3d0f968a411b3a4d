//! Mounted slot instances and composition diffing.
//!
//! An instance from the previous composition is kept when the new one has
//! the same key under the same kept parent. Everything else is unmounted
//! (innermost first) and the new frames are mounted (outermost first).

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::render::{InstanceKey, View};

/// Hooks into the UI component engine.
pub trait MountHooks: Send + Sync {
    fn mounted(&self, _key: &InstanceKey) {}
    fn unmounted(&self, _key: &InstanceKey) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl MountHooks for NoopHooks {}

#[derive(Debug, Clone)]
struct Instance {
    parent: Option<InstanceKey>,
    state: Option<Value>,
}

/// What one commit changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountDiff {
    pub kept: Vec<InstanceKey>,
    pub mounted: Vec<InstanceKey>,
    pub unmounted: Vec<InstanceKey>,
}

/// Instances currently mounted, with their local state.
#[derive(Debug, Clone, Default)]
pub struct MountedTree {
    instances: BTreeMap<InstanceKey, Instance>,
}

impl MountedTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mounted composition with `view`.
    pub fn apply(&mut self, view: &View, hooks: &dyn MountHooks) -> MountDiff {
        let mut diff = MountDiff::default();
        let mut next = BTreeMap::new();
        let mut kept: HashSet<InstanceKey> = HashSet::new();

        view.visit_frames(&mut |key, parent| {
            let parent_kept = parent.is_none_or(|p| kept.contains(p));
            let previous = self
                .instances
                .get(key)
                .filter(|old| parent_kept && old.parent.as_ref() == parent);

            let state = match previous {
                Some(old) => {
                    kept.insert(*key);
                    diff.kept.push(*key);
                    old.state.clone()
                }
                None => {
                    diff.mounted.push(*key);
                    None
                }
            };
            next.insert(
                *key,
                Instance {
                    parent: parent.copied(),
                    state,
                },
            );
        });

        let mut gone: Vec<InstanceKey> = self
            .instances
            .keys()
            .filter(|key| !kept.contains(key))
            .copied()
            .collect();
        gone.sort_by(|a, b| b.depth.cmp(&a.depth).then(b.slot.cmp(&a.slot)));
        for key in &gone {
            hooks.unmounted(key);
        }
        for key in &diff.mounted {
            hooks.mounted(key);
        }
        diff.unmounted = gone;

        tracing::trace!(
            kept = diff.kept.len(),
            mounted = diff.mounted.len(),
            unmounted = diff.unmounted.len(),
            "Composition applied"
        );
        self.instances = next;
        diff
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.instances.contains_key(key)
    }

    pub fn keys(&self) -> Vec<InstanceKey> {
        self.instances.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Local state of a mounted instance.
    pub fn state(&self, key: &InstanceKey) -> Option<&Value> {
        self.instances.get(key).and_then(|i| i.state.as_ref())
    }

    /// Set local state; false if `key` is not mounted.
    pub fn set_state(&mut self, key: &InstanceKey, value: Value) -> bool {
        match self.instances.get_mut(key) {
            Some(instance) => {
                instance.state = Some(value);
                true
            }
            None => false,
        }
    }
}
