//! Provides a strategy which evicts entries in the order they were created.
use std::time::Duration;

use crate::entry::{CacheEntry, Instant};
use crate::strategy::{first_min_by, EvictionStrategy};

/// The max age of an entry before it is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Evicts the oldest entries first.
///
/// Entries are considered stale once they are older than **max_age**, no matter how often they
/// are read. When room has to be made, the entry which was created first is evicted.
#[derive(Clone, Debug)]
pub struct FirstInFirstOut {
    max_age: Duration,
}

impl FirstInFirstOut {
    /// Creates a new strategy which considers entries stale once they are older than **max_age**.
    pub fn new(max_age: Duration) -> Self {
        FirstInFirstOut { max_age }
    }

    /// Returns the max age of an entry.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl EvictionStrategy for FirstInFirstOut {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        entry.age(now) > self.max_age
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        _now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        first_min_by(entries, |entry| entry.timestamp)
    }

    fn on_access<V>(&self, _entry: &mut CacheEntry<V>, _now: Instant) {}

    fn name(&self) -> &'static str {
        "fifo"
    }
}
