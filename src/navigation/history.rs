//! Session history.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::render::RenderPayload;
use crate::resolve::MatchChain;

/// Scroll offset recorded when an entry is left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: u32,
    pub y: u32,
}

impl ScrollPosition {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// One visited location with the snapshot it was rendered from.
#[derive(Debug, Clone)]
pub struct NavigationEntry {
    /// Resolved path plus query.
    pub url: String,
    pub chain: MatchChain,
    pub payload: RenderPayload,
    pub scroll_position: ScrollPosition,
    /// When the snapshot was rendered.
    pub timestamp: Instant,
    /// Navigation sequence number that committed this entry.
    pub navigation: u64,
}

/// History stack with a pointer to the current entry.
///
/// Push truncates everything after the pointer, then appends; replace
/// overwrites the current entry in place.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: Vec<NavigationEntry>,
    pointer: usize,
    capacity: usize,
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            pointer: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: NavigationEntry) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.pointer + 1);
        }
        self.entries.push(entry);
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        self.pointer = self.entries.len() - 1;
    }

    pub fn replace(&mut self, entry: NavigationEntry) {
        match self.entries.get_mut(self.pointer) {
            Some(current) => *current = entry,
            None => self.push(entry),
        }
    }

    pub fn current(&self) -> Option<&NavigationEntry> {
        self.entries.get(self.pointer)
    }

    pub fn current_mut(&mut self) -> Option<&mut NavigationEntry> {
        self.entries.get_mut(self.pointer)
    }

    fn target(&self, delta: isize) -> Option<usize> {
        let target = self.pointer.checked_add_signed(delta)?;
        (target < self.entries.len()).then_some(target)
    }

    /// Entry `delta` steps away, without moving.
    pub fn peek(&self, delta: isize) -> Option<&NavigationEntry> {
        self.target(delta).map(|i| &self.entries[i])
    }

    /// Move the pointer by `delta`; `None` (and no move) if out of range.
    pub fn go(&mut self, delta: isize) -> Option<&mut NavigationEntry> {
        let target = self.target(delta)?;
        self.pointer = target;
        self.entries.get_mut(target)
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.url.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderStatus;
    use crate::resolve::{RequestPath, SegmentResolver};
    use crate::tree::{RouteTreeBuilder, SlotKind};

    fn entry(url: &str) -> NavigationEntry {
        let tree = RouteTreeBuilder::new().slot("", SlotKind::Page).build().unwrap();
        let chain = SegmentResolver::new(&tree).resolve(&RequestPath::parse("/")).unwrap();
        NavigationEntry {
            url: url.to_string(),
            chain,
            payload: RenderPayload {
                status: RenderStatus::Ok,
                body: None,
                head: Ok(Default::default()),
                data: Vec::new(),
            },
            scroll_position: ScrollPosition::default(),
            timestamp: Instant::now(),
            navigation: 0,
        }
    }

    #[test]
    fn test_push_truncates_forward_entries() {
        let mut history = HistoryStack::new(10);
        history.push(entry("/a"));
        history.push(entry("/b"));
        history.push(entry("/c"));
        history.go(-2).unwrap();
        history.push(entry("/d"));
        assert_eq!(history.urls(), vec!["/a", "/d"]);
        assert_eq!(history.pointer(), 1);
    }

    #[test]
    fn test_replace_overwrites_in_place() {
        let mut history = HistoryStack::new(10);
        history.push(entry("/a"));
        history.push(entry("/b"));
        history.replace(entry("/c"));
        assert_eq!(history.urls(), vec!["/a", "/c"]);
    }

    #[test]
    fn test_go_out_of_range_does_not_move() {
        let mut history = HistoryStack::new(10);
        history.push(entry("/a"));
        assert!(history.go(-1).is_none());
        assert!(history.go(1).is_none());
        assert_eq!(history.current().unwrap().url, "/a");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = HistoryStack::new(2);
        history.push(entry("/a"));
        history.push(entry("/b"));
        history.push(entry("/c"));
        assert_eq!(history.urls(), vec!["/b", "/c"]);
        assert_eq!(history.current().unwrap().url, "/c");
    }
}
