//! Provides a strategy which combines [TimeToLive](TimeToLive) and
//! [LeastRecentlyUsed](LeastRecentlyUsed).
use std::time::Duration;

use crate::entry::{CacheEntry, Instant};
use crate::strategy::lru::LeastRecentlyUsed;
use crate::strategy::ttl::TimeToLive;
use crate::strategy::EvictionStrategy;

/// Evicts entries which are either expired or haven't been used for a while.
///
/// An entry is stale if either of both strategies considers it stale. When room has to be made,
/// an actually expired entry is preferred. Otherwise the least recently used entry is evicted.
/// Reads are tracked just like **lru** does.
///
/// This is the default strategy of a cache.
#[derive(Clone, Debug)]
pub struct Hybrid {
    ttl: TimeToLive,
    lru: LeastRecentlyUsed,
}

impl Hybrid {
    /// Creates a new strategy with the given default time to live and max idle time.
    pub fn new(ttl: Duration, max_age: Duration) -> Self {
        Hybrid {
            ttl: TimeToLive::new(ttl),
            lru: LeastRecentlyUsed::new(max_age),
        }
    }
}

impl EvictionStrategy for Hybrid {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        self.ttl.should_evict(entry, now) || self.lru.should_evict(entry, now)
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        match self.ttl.select_for_eviction(entries, now) {
            Some(expired) if self.ttl.should_evict(expired, now) => Some(expired),
            _ => self.lru.select_for_eviction(entries, now),
        }
    }

    fn on_access<V>(&self, entry: &mut CacheEntry<V>, now: Instant) {
        self.lru.on_access(entry, now);
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
