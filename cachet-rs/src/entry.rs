//! Contains the unit of storage of a [CacheManager](crate::manager::CacheManager).
//!
//! An entry is a plain data holder. Its metadata is only ever changed by the active
//! [strategy](crate::strategy) (when the entry is accessed) or by the manager itself (when the
//! entry is created or removed).
use std::time::Duration;

/// The clock used for all timestamps of the cache.
///
/// Within tests this is replaced by **mock_instant** so that time can be advanced manually.
#[cfg(test)]
pub use mock_instant::thread_local::Instant;
/// The clock used for all timestamps of the cache.
///
/// Within tests this is replaced by **mock_instant** so that time can be advanced manually.
#[cfg(not(test))]
pub use std::time::Instant;

/// Represents a single value stored in the cache along with its metadata.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    /// The key under which the entry is stored.
    pub key: String,
    /// The cached value.
    pub value: V,
    /// The instant at which the entry was created.
    pub timestamp: Instant,
    /// The instant of the last successful read. This is never before **timestamp**.
    pub last_accessed: Instant,
    /// The number of successful reads as counted by the active strategy.
    pub access_count: u64,
    /// An optional time to live which overrides the default of a TTL based strategy.
    pub ttl: Option<Duration>,
    /// An optional size in bytes which is accounted against the **max_memory** setting.
    pub size: Option<usize>,
}

impl<V> CacheEntry<V> {
    /// Creates a fresh entry which has been created and last accessed at **now**.
    pub fn new(
        key: impl Into<String>,
        value: V,
        ttl: Option<Duration>,
        size: Option<usize>,
        now: Instant,
    ) -> Self {
        CacheEntry {
            key: key.into(),
            value,
            timestamp: now,
            last_accessed: now,
            access_count: 0,
            ttl,
            size,
        }
    }

    /// Returns the time elapsed since the entry was created.
    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.timestamp)
    }

    /// Returns the time elapsed since the entry was last read (or created if it was never read).
    pub fn idle(&self, now: Instant) -> Duration {
        now.duration_since(self.last_accessed)
    }

    /// Returns the explicit size of this entry or 0 if none was given.
    pub fn accounted_size(&self) -> usize {
        self.size.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::{CacheEntry, Instant};
    use mock_instant::thread_local::MockClock;
    use std::time::Duration;

    #[test]
    fn a_fresh_entry_is_initialized_properly() {
        let now = Instant::now();
        let entry = CacheEntry::new("key", 42, None, Some(16), now);

        assert_eq!(entry.timestamp, entry.last_accessed);
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.accounted_size(), 16);
        assert_eq!(entry.age(now), Duration::ZERO);
    }

    #[test]
    fn age_and_idle_time_are_tracked_separately() {
        let mut entry = CacheEntry::new("key", (), None, None, Instant::now());

        MockClock::advance(Duration::from_secs(10));
        entry.last_accessed = Instant::now();
        MockClock::advance(Duration::from_secs(5));

        let now = Instant::now();
        assert_eq!(entry.age(now), Duration::from_secs(15));
        assert_eq!(entry.idle(now), Duration::from_secs(5));
        assert_eq!(entry.accounted_size(), 0);
    }
}
