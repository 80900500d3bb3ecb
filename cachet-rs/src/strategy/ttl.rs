//! Provides a strategy which drops entries once their time to live has elapsed.
use std::time::Duration;

use crate::entry::{CacheEntry, Instant};
use crate::strategy::{first_min_by, EvictionStrategy};

/// The time to live applied to entries which don't specify their own one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Evicts entries which are older than their time to live.
///
/// An entry can carry its own **ttl**, otherwise the default of the strategy applies. Reading an
/// entry doesn't extend its lifetime.
///
/// When room has to be made, the entry which exceeded its time to live the most is evicted. If
/// no entry has expired yet, the oldest entry (by creation time) is evicted instead.
#[derive(Clone, Debug)]
pub struct TimeToLive {
    default_ttl: Duration,
}

impl TimeToLive {
    /// Creates a new strategy using the given default time to live.
    pub fn new(default_ttl: Duration) -> Self {
        TimeToLive { default_ttl }
    }

    /// Returns the time to live which is applied to entries without an explicit one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Determines by how much the given entry exceeded its time to live.
    ///
    /// Returns **None** if the entry hasn't expired yet.
    fn excess_age<V>(&self, entry: &CacheEntry<V>, now: Instant) -> Option<Duration> {
        let ttl = entry.ttl.unwrap_or(self.default_ttl);
        entry
            .age(now)
            .checked_sub(ttl)
            .filter(|excess| !excess.is_zero())
    }
}

impl EvictionStrategy for TimeToLive {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        self.excess_age(entry, now).is_some()
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        let mut most_expired: Option<(&'a CacheEntry<V>, Duration)> = None;
        for entry in entries.iter().copied() {
            if let Some(excess) = self.excess_age(entry, now) {
                match most_expired {
                    Some((_, max_excess)) if max_excess >= excess => (),
                    _ => most_expired = Some((entry, excess)),
                }
            }
        }

        most_expired
            .map(|(entry, _)| entry)
            .or_else(|| first_min_by(entries, |entry| entry.timestamp))
    }

    fn on_access<V>(&self, _entry: &mut CacheEntry<V>, _now: Instant) {
        // Reading an entry doesn't affect its time to live...
    }

    fn name(&self) -> &'static str {
        "ttl"
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::{CacheEntry, Instant};
    use crate::strategy::ttl::TimeToLive;
    use crate::strategy::EvictionStrategy;
    use mock_instant::thread_local::MockClock;
    use std::time::Duration;

    #[test]
    fn entries_expire_after_their_ttl() {
        let strategy = TimeToLive::new(Duration::from_millis(100));
        let default_entry = CacheEntry::new("a", 1, None, None, Instant::now());
        let short_entry = CacheEntry::new("b", 2, Some(Duration::from_millis(10)), None, Instant::now());

        MockClock::advance(Duration::from_millis(50));
        assert_eq!(strategy.should_evict(&default_entry, Instant::now()), false);
        assert_eq!(strategy.should_evict(&short_entry, Instant::now()), true);

        MockClock::advance(Duration::from_millis(100));
        assert_eq!(strategy.should_evict(&default_entry, Instant::now()), true);
    }

    #[test]
    fn an_entry_exactly_at_its_ttl_is_still_alive() {
        let strategy = TimeToLive::new(Duration::from_millis(100));
        let entry = CacheEntry::new("a", 1, None, None, Instant::now());

        MockClock::advance(Duration::from_millis(100));
        assert_eq!(strategy.should_evict(&entry, Instant::now()), false);
    }

    #[test]
    fn the_most_expired_entry_is_selected() {
        let mut strategy = TimeToLive::new(Duration::from_secs(60));
        let old = CacheEntry::new("old", 1, None, None, Instant::now());
        MockClock::advance(Duration::from_secs(10));
        let short = CacheEntry::new("short", 2, Some(Duration::from_secs(1)), None, Instant::now());
        let young = CacheEntry::new("young", 3, None, None, Instant::now());

        // "old" is 5s past its ttl, "short" is 64s past its ttl and "young" is alive...
        MockClock::advance(Duration::from_secs(55));
        let victim = strategy
            .select_for_eviction(&[&old, &short, &young], Instant::now())
            .unwrap();
        assert_eq!(victim.key, "short");
    }

    #[test]
    fn the_oldest_entry_is_selected_if_none_expired() {
        let mut strategy = TimeToLive::new(Duration::from_secs(60));
        MockClock::advance(Duration::from_secs(1));
        let newer = CacheEntry::new("newer", 1, None, None, Instant::now() + Duration::from_secs(1));
        let older = CacheEntry::new("older", 2, None, None, Instant::now());

        let victim = strategy
            .select_for_eviction(&[&newer, &older], Instant::now() + Duration::from_secs(2))
            .unwrap();
        assert_eq!(victim.key, "older");

        let empty: [&CacheEntry<i32>; 0] = [];
        assert_eq!(strategy.select_for_eviction(&empty, Instant::now()).is_none(), true);
    }

    #[test]
    fn access_does_not_extend_the_lifetime() {
        let strategy = TimeToLive::new(Duration::from_millis(100));
        let mut entry = CacheEntry::new("a", 1, None, None, Instant::now());

        MockClock::advance(Duration::from_millis(80));
        strategy.on_access(&mut entry, Instant::now());
        MockClock::advance(Duration::from_millis(80));

        assert_eq!(entry.access_count, 0);
        assert_eq!(strategy.should_evict(&entry, Instant::now()), true);
    }
}
