//! Provides a strategy which drops entries that have been read too rarely.
use crate::entry::{CacheEntry, Instant};
use crate::strategy::{first_min_by, EvictionStrategy};

/// The number of reads an entry needs to be kept around.
pub const DEFAULT_MIN_ACCESS_COUNT: u64 = 2;

/// Evicts entries which have been read less than a given number of times.
///
/// Note that this is a threshold rather than a classic least frequently used eviction: an entry
/// is considered stale as long as its **access_count** is below **min_access_count**. As the
/// count of a fresh entry is zero, such an entry is dropped by the very next lookup unless the
/// threshold is zero. When room has to be made, the entry with the smallest **access_count** is
/// evicted.
#[derive(Clone, Debug)]
pub struct MinimumAccessCount {
    min_access_count: u64,
}

impl MinimumAccessCount {
    /// Creates a new strategy using the given threshold.
    pub fn new(min_access_count: u64) -> Self {
        MinimumAccessCount { min_access_count }
    }

    /// Returns the number of reads required to keep an entry.
    pub fn min_access_count(&self) -> u64 {
        self.min_access_count
    }
}

impl EvictionStrategy for MinimumAccessCount {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, _now: Instant) -> bool {
        entry.access_count < self.min_access_count
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        _now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        first_min_by(entries, |entry| entry.access_count)
    }

    fn on_access<V>(&self, entry: &mut CacheEntry<V>, _now: Instant) {
        entry.access_count = entry.access_count.saturating_add(1);
    }

    fn name(&self) -> &'static str {
        "lfu"
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::{CacheEntry, Instant};
    use crate::strategy::lfu::MinimumAccessCount;
    use crate::strategy::EvictionStrategy;

    #[test]
    fn entries_below_the_threshold_are_stale() {
        let strategy = MinimumAccessCount::new(2);
        let mut entry = CacheEntry::new("a", 1, None, None, Instant::now());

        assert_eq!(strategy.should_evict(&entry, Instant::now()), true);
        strategy.on_access(&mut entry, Instant::now());
        assert_eq!(strategy.should_evict(&entry, Instant::now()), true);
        strategy.on_access(&mut entry, Instant::now());
        assert_eq!(strategy.should_evict(&entry, Instant::now()), false);
        assert_eq!(entry.access_count, 2);
    }

    #[test]
    fn a_zero_threshold_keeps_everything() {
        let strategy = MinimumAccessCount::new(0);
        let entry = CacheEntry::new("a", 1, None, None, Instant::now());

        assert_eq!(strategy.should_evict(&entry, Instant::now()), false);
    }

    #[test]
    fn the_least_read_entry_is_selected() {
        let mut strategy = MinimumAccessCount::new(2);
        let mut popular = CacheEntry::new("popular", 1, None, None, Instant::now());
        let mut rare = CacheEntry::new("rare", 2, None, None, Instant::now());
        let mut also_rare = CacheEntry::new("also_rare", 3, None, None, Instant::now());

        for _ in 0..5 {
            strategy.on_access(&mut popular, Instant::now());
        }
        strategy.on_access(&mut rare, Instant::now());
        strategy.on_access(&mut also_rare, Instant::now());

        let victim = strategy
            .select_for_eviction(&[&popular, &rare, &also_rare], Instant::now())
            .unwrap();
        assert_eq!(victim.key, "rare");
    }
}
