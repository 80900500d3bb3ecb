//! Provides a strategy which drops entries that haven't been read for a while.
use std::time::Duration;

use crate::entry::{CacheEntry, Instant};
use crate::strategy::{first_min_by, EvictionStrategy};

/// The max time an entry may stay unread before it is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Evicts the least recently used entries.
///
/// Each successful read refreshes the **last_accessed** timestamp of an entry. An entry which
/// hasn't been read for longer than **max_age** is considered stale. When room has to be made,
/// the entry with the oldest **last_accessed** timestamp is evicted.
#[derive(Clone, Debug)]
pub struct LeastRecentlyUsed {
    max_age: Duration,
}

impl LeastRecentlyUsed {
    /// Creates a new strategy which considers entries stale after being idle for **max_age**.
    pub fn new(max_age: Duration) -> Self {
        LeastRecentlyUsed { max_age }
    }

    /// Returns the max idle time of an entry.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl EvictionStrategy for LeastRecentlyUsed {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        entry.idle(now) > self.max_age
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        _now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        first_min_by(entries, |entry| entry.last_accessed)
    }

    fn on_access<V>(&self, entry: &mut CacheEntry<V>, now: Instant) {
        // Never move backwards, so that last_accessed stays >= timestamp.
        if now > entry.last_accessed {
            entry.last_accessed = now;
        }
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::{CacheEntry, Instant};
    use crate::strategy::lru::LeastRecentlyUsed;
    use crate::strategy::EvictionStrategy;
    use mock_instant::thread_local::MockClock;
    use std::time::Duration;

    #[test]
    fn reading_an_entry_keeps_it_alive() {
        let strategy = LeastRecentlyUsed::new(Duration::from_secs(60));
        let mut entry = CacheEntry::new("a", 1, None, None, Instant::now());

        MockClock::advance(Duration::from_secs(50));
        assert_eq!(strategy.should_evict(&entry, Instant::now()), false);
        strategy.on_access(&mut entry, Instant::now());

        MockClock::advance(Duration::from_secs(50));
        assert_eq!(strategy.should_evict(&entry, Instant::now()), false);

        MockClock::advance(Duration::from_secs(11));
        assert_eq!(strategy.should_evict(&entry, Instant::now()), true);
        assert_eq!(entry.last_accessed >= entry.timestamp, true);
    }

    #[test]
    fn a_touched_entry_is_not_selected_over_an_older_one() {
        let mut strategy = LeastRecentlyUsed::new(Duration::from_secs(60));
        let mut touched = CacheEntry::new("touched", 1, None, None, Instant::now());
        let older = CacheEntry::new("older", 2, None, None, Instant::now());

        MockClock::advance(Duration::from_secs(1));
        strategy.on_access(&mut touched, Instant::now());
        assert_eq!(touched.last_accessed > touched.timestamp, true);

        let victim = strategy
            .select_for_eviction(&[&touched, &older], Instant::now())
            .unwrap();
        assert_eq!(victim.key, "older");
    }

    #[test]
    fn ties_are_resolved_by_iteration_order() {
        let mut strategy = LeastRecentlyUsed::new(Duration::from_secs(60));
        let a = CacheEntry::new("a", 1, None, None, Instant::now());
        let b = CacheEntry::new("b", 2, None, None, Instant::now());

        let victim = strategy
            .select_for_eviction(&[&b, &a], Instant::now())
            .unwrap();
        assert_eq!(victim.key, "b");
    }
}
