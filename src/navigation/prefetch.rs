//! Prefetched route payloads.
//!
//! # Responsibilities
//! - Hold rendered payloads keyed by resolved path plus query
//! - Expire entries after a staleness window
//! - Bound concurrent prefetches with a semaphore
//! - Drop everything on invalidation, including prefetches still in flight
//!
//! # Design Decisions
//! - Each prefetch captures the epoch it started in; an insert from an
//!   older epoch is discarded, so a refresh cannot be undone by a late
//!   prefetch
//! - At capacity the oldest entry is evicted

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::observability::metrics;
use crate::render::RenderPayload;
use crate::resolve::MatchChain;

/// A rendered payload ready to be committed.
#[derive(Debug, Clone)]
pub struct PrefetchEntry {
    pub chain: MatchChain,
    pub payload: RenderPayload,
    pub fetched_at: Instant,
}

impl PrefetchEntry {
    pub fn new(chain: MatchChain, payload: RenderPayload) -> Self {
        Self {
            chain,
            payload,
            fetched_at: Instant::now(),
        }
    }
}

pub struct PrefetchCache {
    entries: DashMap<String, PrefetchEntry>,
    permits: Arc<Semaphore>,
    capacity: usize,
    stale_after: Duration,
    epoch: AtomicU64,
}

impl PrefetchCache {
    pub fn new(concurrency: usize, capacity: usize, stale_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            capacity: capacity.max(1),
            stale_after,
            epoch: AtomicU64::new(0),
        }
    }

    /// Fresh entry for `key`; stale entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<PrefetchEntry> {
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.fetched_at.elapsed() > self.stale_after {
            self.entries.remove(key);
            metrics::record_prefetch("stale");
            return None;
        }
        metrics::record_prefetch("hit");
        Some(entry)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.fetched_at.elapsed() <= self.stale_after)
    }

    /// Store a prefetch that started in `epoch`. Returns false if the cache
    /// was invalidated since.
    pub fn insert(&self, key: String, entry: PrefetchEntry, epoch: u64) -> bool {
        if epoch != self.epoch() {
            tracing::debug!(key = %key, "Discarding prefetch from an invalidated epoch");
            metrics::record_prefetch("discarded");
            return false;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, entry);
        metrics::record_prefetch("stored");
        true
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().fetched_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::trace!(key = %key, "Evicted prefetch entry");
        }
    }

    /// Drop all entries and start a new epoch.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        self.permits.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderStatus;
    use crate::resolve::{RequestPath, SegmentResolver};
    use crate::tree::{RouteTreeBuilder, SlotKind};

    fn entry() -> PrefetchEntry {
        let tree = RouteTreeBuilder::new().slot("", SlotKind::Page).build().unwrap();
        let chain = SegmentResolver::new(&tree).resolve(&RequestPath::parse("/")).unwrap();
        PrefetchEntry::new(
            chain,
            RenderPayload {
                status: RenderStatus::Ok,
                body: None,
                head: Ok(Default::default()),
                data: Vec::new(),
            },
        )
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = PrefetchCache::new(2, 2, Duration::from_secs(30));
        assert!(cache.insert("/a".into(), entry(), 0));
        assert!(cache.insert("/b".into(), entry(), 0));
        assert!(cache.insert("/c".into(), entry(), 0));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("/a"));
        assert!(cache.contains("/c"));
    }

    #[test]
    fn test_stale_entries_are_dropped() {
        let cache = PrefetchCache::new(2, 8, Duration::ZERO);
        let mut old = entry();
        old.fetched_at = Instant::now() - Duration::from_millis(5);
        cache.insert("/a".into(), old, 0);
        assert!(cache.get("/a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_discards_in_flight_inserts() {
        let cache = PrefetchCache::new(2, 8, Duration::from_secs(30));
        let started = cache.epoch();
        cache.insert("/a".into(), entry(), started);
        cache.invalidate();
        assert!(cache.is_empty());
        assert!(!cache.insert("/b".into(), entry(), started));
        assert!(cache.insert("/b".into(), entry(), cache.epoch()));
    }
}
