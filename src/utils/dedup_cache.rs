//! Recent-message cache for duplicate suppression
//!
//! Tracks when each message id was last processed so a packet heard again
//! (re-advertised by the previous hop, or picked up twice during one advertise
//! period) is not forwarded or delivered a second time.
//!
//! Entries are advisory. Expiry and capacity eviction only weaken duplicate
//! suppression; they never affect routing correctness.
//!
//! The key is the bare one-byte message id, not `(source, id)`. Two sources that
//! pick the same id within one window collide and the later packet is dropped at
//! hops that saw the earlier one.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Last time an id was accepted
#[derive(Debug, Clone, Copy)]
struct RecentMessageRecord {
    last_seen_at: Instant,
}

/// TTL-bounded map from message id to the time it was last accepted
#[derive(Debug)]
pub struct DedupCache {
    entries: HashMap<u8, RecentMessageRecord>,
    /// Insertion order for FIFO eviction when the cache is full
    insertion_order: VecDeque<u8>,
    window: Duration,
    max_entries: usize,
}

impl DedupCache {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            window,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns true if `id` was accepted within the window ending at `now`.
    ///
    /// Otherwise records `(id, now)` and returns false. A suppressed duplicate does
    /// not extend the window.
    pub fn is_duplicate(&mut self, id: u8, now: Instant) -> bool {
        self.cleanup_expired(now);

        if let Some(record) = self.entries.get(&id) {
            if now < record.last_seen_at + self.window {
                trace!(id, "Duplicate message id suppressed");
                return true;
            }
        }

        if !self.entries.contains_key(&id) && self.entries.len() >= self.max_entries {
            self.remove_oldest_entries(self.entries.len() - self.max_entries + 1);
        }

        if self
            .entries
            .insert(id, RecentMessageRecord { last_seen_at: now })
            .is_none()
        {
            self.insertion_order.push_back(id);
        }
        false
    }

    fn cleanup_expired(&mut self, now: Instant) {
        let initial_count = self.entries.len();
        let window = self.window;

        self.entries
            .retain(|_, record| now < record.last_seen_at + window);
        self.insertion_order.retain(|id| self.entries.contains_key(id));

        let removed = initial_count - self.entries.len();
        if removed > 0 {
            debug!("Expired {} message ids from dedup cache", removed);
        }
    }

    #[inline]
    fn remove_oldest_entries(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(id) = self.insertion_order.pop_front() {
                self.entries.remove(&id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}
