//! Provides a strategy which picks between **ttl** and **lru** based on the observed hit rate.
use std::time::Duration;

use crate::entry::{CacheEntry, Instant};
use crate::strategy::lru::LeastRecentlyUsed;
use crate::strategy::ttl::TimeToLive;
use crate::strategy::{EvictionStrategy, StrategyKind};

/// The number of recorded reads required before the strategy starts to adapt.
pub const MIN_SAMPLES: u64 = 100;

/// The hit rate below which the strategy switches to **lru**.
pub const LOW_HIT_RATE: f64 = 0.5;

/// Switches between [TimeToLive](TimeToLive) and [LeastRecentlyUsed](LeastRecentlyUsed).
///
/// The strategy starts with **ttl**. Each time an entry has to be selected for eviction and at
/// least [MIN_SAMPLES](MIN_SAMPLES) reads have been recorded, the hit rate is inspected. A hit
/// rate below [LOW_HIT_RATE](LOW_HIT_RATE) activates the more aggressive **lru**, otherwise
/// **ttl** is used. All other calls are simply delegated to the active strategy.
///
/// The samples are fed via [record_access](EvictionStrategy::record_access) which is invoked by
/// the cache for each lookup.
#[derive(Clone, Debug)]
pub struct Adaptive {
    ttl: TimeToLive,
    lru: LeastRecentlyUsed,
    active: StrategyKind,
    hits: u64,
    misses: u64,
}

impl Adaptive {
    /// Creates a new strategy with the given default time to live and max idle time.
    pub fn new(ttl: Duration, max_age: Duration) -> Self {
        Adaptive {
            ttl: TimeToLive::new(ttl),
            lru: LeastRecentlyUsed::new(max_age),
            active: StrategyKind::Ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the kind of the currently active strategy (either **Ttl** or **Lru**).
    pub fn active(&self) -> StrategyKind {
        self.active
    }

    /// Returns the hit rate (0..=1) of all recorded reads.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn adapt(&mut self) {
        if self.hits + self.misses < MIN_SAMPLES {
            return;
        }

        let next = if self.hit_rate() < LOW_HIT_RATE {
            StrategyKind::Lru
        } else {
            StrategyKind::Ttl
        };

        if next != self.active {
            log::debug!(
                "Adaptive cache strategy switches from '{}' to '{}' (hit rate: {:.1} %)",
                self.active,
                next,
                self.hit_rate() * 100.
            );
            self.active = next;
        }
    }
}

impl EvictionStrategy for Adaptive {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        match self.active {
            StrategyKind::Lru => self.lru.should_evict(entry, now),
            _ => self.ttl.should_evict(entry, now),
        }
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        self.adapt();
        match self.active {
            StrategyKind::Lru => self.lru.select_for_eviction(entries, now),
            _ => self.ttl.select_for_eviction(entries, now),
        }
    }

    fn on_access<V>(&self, entry: &mut CacheEntry<V>, now: Instant) {
        match self.active {
            StrategyKind::Lru => self.lru.on_access(entry, now),
            _ => self.ttl.on_access(entry, now),
        }
    }

    fn record_access(&mut self, hit: bool) {
        if hit {
            self.hits = self.hits.saturating_add(1);
        } else {
            self.misses = self.misses.saturating_add(1);
        }
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}
