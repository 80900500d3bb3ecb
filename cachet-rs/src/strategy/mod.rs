//! Provides the eviction strategies which decide which entries leave the cache.
//!
//! A [CacheManager](crate::manager::CacheManager) never decides on its own whether an entry is
//! stale or which entry has to make room for a new one. It rather asks its strategy, which
//! implements [EvictionStrategy](EvictionStrategy). Strategies only ever inspect or update the
//! metadata of the entries they are handed and never access the backing storage itself.
//!
//! The following strategies are available (along with the name used in the config):
//! * **ttl**: [TimeToLive](ttl::TimeToLive) drops entries once they are older than their time to
//!   live.
//! * **lru**: [LeastRecentlyUsed](lru::LeastRecentlyUsed) drops entries which have not been read
//!   for a while and evicts the least recently used entry when making room.
//! * **lfu**: [MinimumAccessCount](lfu::MinimumAccessCount) drops entries which have been read
//!   less than a given number of times.
//! * **fifo**: [FirstInFirstOut](fifo::FirstInFirstOut) drops entries once they reach a maximal
//!   age and evicts the oldest entry when making room.
//! * **hybrid**: [Hybrid](hybrid::Hybrid) combines **ttl** and **lru**.
//! * **adaptive**: [Adaptive](adaptive::Adaptive) switches between **ttl** and **lru** based on
//!   the observed hit rate.
//!
//! All strategies are wrapped in the [Strategy](Strategy) enum which is what the manager
//! actually keeps around. Use [Strategy::new](Strategy::new) to build one by its kind.
use std::fmt;
use std::fmt::Display;
use std::time::Duration;

use crate::entry::{CacheEntry, Instant};

pub mod adaptive;
pub mod fifo;
pub mod hybrid;
pub mod lfu;
pub mod lru;
pub mod ttl;

use adaptive::Adaptive;
use fifo::FirstInFirstOut;
use hybrid::Hybrid;
use lfu::MinimumAccessCount;
use lru::LeastRecentlyUsed;
use ttl::TimeToLive;

/// Describes the capabilities every eviction strategy has to provide.
pub trait EvictionStrategy {
    /// Determines if the given entry is stale and should be removed from the cache.
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool;

    /// Picks the entry which has to make room for a new one.
    ///
    /// The entries are given in the iteration order of the cache. Ties are resolved in favor of
    /// the first candidate. Returns **None** only if no entries are given.
    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        now: Instant,
    ) -> Option<&'a CacheEntry<V>>;

    /// Updates the metadata of an entry which has just been read successfully.
    fn on_access<V>(&self, entry: &mut CacheEntry<V>, now: Instant);

    /// Records the outcome of a read (hit or miss).
    ///
    /// Most strategies don't care, therefore the default implementation does nothing.
    fn record_access(&mut self, _hit: bool) {}

    /// Returns the name of the strategy as used in the config.
    fn name(&self) -> &'static str;
}

/// Enumerates the known kinds of strategies.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StrategyKind {
    /// Selects [TimeToLive](ttl::TimeToLive).
    Ttl,
    /// Selects [LeastRecentlyUsed](lru::LeastRecentlyUsed).
    Lru,
    /// Selects [MinimumAccessCount](lfu::MinimumAccessCount).
    Lfu,
    /// Selects [FirstInFirstOut](fifo::FirstInFirstOut).
    Fifo,
    /// Selects [Hybrid](hybrid::Hybrid).
    Hybrid,
    /// Selects [Adaptive](adaptive::Adaptive).
    Adaptive,
}

impl StrategyKind {
    /// Resolves a strategy kind by its name.
    ///
    /// An unknown name doesn't fail but falls back to **ttl**.
    ///
    /// # Examples
    /// ```
    /// # use cachet::strategy::StrategyKind;
    /// assert_eq!(StrategyKind::parse("LRU"), StrategyKind::Lru);
    /// assert_eq!(StrategyKind::parse("adaptive"), StrategyKind::Adaptive);
    /// assert_eq!(StrategyKind::parse("random"), StrategyKind::Ttl);
    /// ```
    pub fn parse(name: &str) -> StrategyKind {
        match name.trim().to_ascii_lowercase().as_str() {
            "ttl" => StrategyKind::Ttl,
            "lru" => StrategyKind::Lru,
            "lfu" => StrategyKind::Lfu,
            "fifo" => StrategyKind::Fifo,
            "hybrid" => StrategyKind::Hybrid,
            "adaptive" => StrategyKind::Adaptive,
            _ => {
                log::warn!("Unknown cache strategy '{}'. Falling back to 'ttl'.", name);
                StrategyKind::Ttl
            }
        }
    }

    /// Returns the name of this kind as used in the config.
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Ttl => "ttl",
            StrategyKind::Lru => "lru",
            StrategyKind::Lfu => "lfu",
            StrategyKind::Fifo => "fifo",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Adaptive => "adaptive",
        }
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contains the tuning parameters of the strategies.
///
/// Each strategy only picks the parameters it understands and applies its own default for each
/// parameter which is left empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StrategyOptions {
    /// The default time to live used by **ttl**, **hybrid** and **adaptive**.
    pub ttl: Option<Duration>,
    /// The max age used by **lru**, **fifo**, **hybrid** and **adaptive**.
    pub max_age: Option<Duration>,
    /// The min number of reads required by **lfu** to keep an entry.
    pub min_access_count: Option<u64>,
}

/// Wraps one of the available strategies.
#[derive(Clone, Debug)]
pub enum Strategy {
    /// See [TimeToLive](ttl::TimeToLive).
    TimeToLive(TimeToLive),
    /// See [LeastRecentlyUsed](lru::LeastRecentlyUsed).
    LeastRecentlyUsed(LeastRecentlyUsed),
    /// See [MinimumAccessCount](lfu::MinimumAccessCount).
    MinimumAccessCount(MinimumAccessCount),
    /// See [FirstInFirstOut](fifo::FirstInFirstOut).
    FirstInFirstOut(FirstInFirstOut),
    /// See [Hybrid](hybrid::Hybrid).
    Hybrid(Hybrid),
    /// See [Adaptive](adaptive::Adaptive).
    Adaptive(Adaptive),
}

impl Strategy {
    /// Builds the strategy of the given kind using the given options.
    ///
    /// # Examples
    /// ```
    /// # use cachet::strategy::{EvictionStrategy, Strategy, StrategyKind, StrategyOptions};
    /// let strategy = Strategy::new(StrategyKind::Fifo, &StrategyOptions::default());
    /// assert_eq!(strategy.name(), "fifo");
    /// ```
    pub fn new(kind: StrategyKind, options: &StrategyOptions) -> Self {
        match kind {
            StrategyKind::Ttl => Strategy::TimeToLive(TimeToLive::new(
                options.ttl.unwrap_or(ttl::DEFAULT_TTL),
            )),
            StrategyKind::Lru => Strategy::LeastRecentlyUsed(LeastRecentlyUsed::new(
                options.max_age.unwrap_or(lru::DEFAULT_MAX_AGE),
            )),
            StrategyKind::Lfu => Strategy::MinimumAccessCount(MinimumAccessCount::new(
                options
                    .min_access_count
                    .unwrap_or(lfu::DEFAULT_MIN_ACCESS_COUNT),
            )),
            StrategyKind::Fifo => Strategy::FirstInFirstOut(FirstInFirstOut::new(
                options.max_age.unwrap_or(fifo::DEFAULT_MAX_AGE),
            )),
            StrategyKind::Hybrid => Strategy::Hybrid(Hybrid::new(
                options.ttl.unwrap_or(ttl::DEFAULT_TTL),
                options.max_age.unwrap_or(lru::DEFAULT_MAX_AGE),
            )),
            StrategyKind::Adaptive => Strategy::Adaptive(Adaptive::new(
                options.ttl.unwrap_or(ttl::DEFAULT_TTL),
                options.max_age.unwrap_or(lru::DEFAULT_MAX_AGE),
            )),
        }
    }

    /// Returns the kind of this strategy.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::TimeToLive(_) => StrategyKind::Ttl,
            Strategy::LeastRecentlyUsed(_) => StrategyKind::Lru,
            Strategy::MinimumAccessCount(_) => StrategyKind::Lfu,
            Strategy::FirstInFirstOut(_) => StrategyKind::Fifo,
            Strategy::Hybrid(_) => StrategyKind::Hybrid,
            Strategy::Adaptive(_) => StrategyKind::Adaptive,
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::new(StrategyKind::Hybrid, &StrategyOptions::default())
    }
}

/// Dispatches a call to the strategy wrapped in the enum.
macro_rules! dispatch {
    ($strategy:expr, $inner:ident => $call:expr) => {
        match $strategy {
            Strategy::TimeToLive($inner) => $call,
            Strategy::LeastRecentlyUsed($inner) => $call,
            Strategy::MinimumAccessCount($inner) => $call,
            Strategy::FirstInFirstOut($inner) => $call,
            Strategy::Hybrid($inner) => $call,
            Strategy::Adaptive($inner) => $call,
        }
    };
}

impl EvictionStrategy for Strategy {
    fn should_evict<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        dispatch!(self, strategy => strategy.should_evict(entry, now))
    }

    fn select_for_eviction<'a, V>(
        &mut self,
        entries: &[&'a CacheEntry<V>],
        now: Instant,
    ) -> Option<&'a CacheEntry<V>> {
        dispatch!(self, strategy => strategy.select_for_eviction(entries, now))
    }

    fn on_access<V>(&self, entry: &mut CacheEntry<V>, now: Instant) {
        dispatch!(self, strategy => strategy.on_access(entry, now))
    }

    fn record_access(&mut self, hit: bool) {
        dispatch!(self, strategy => strategy.record_access(hit))
    }

    fn name(&self) -> &'static str {
        dispatch!(self, strategy => strategy.name())
    }
}

/// Returns the first entry for which **key** yields the smallest value.
///
/// In contrast to **Iterator::min_by_key** this keeps the first of several equal candidates,
/// which is the tie-break rule all strategies follow.
pub(crate) fn first_min_by<'a, V, K: PartialOrd>(
    entries: &[&'a CacheEntry<V>],
    key: impl Fn(&CacheEntry<V>) -> K,
) -> Option<&'a CacheEntry<V>> {
    let mut result: Option<(&'a CacheEntry<V>, K)> = None;
    for entry in entries.iter().copied() {
        let value = key(entry);
        let is_smaller = match &result {
            Some((_, best)) => value < *best,
            None => true,
        };
        if is_smaller {
            result = Some((entry, value));
        }
    }

    result.map(|(entry, _)| entry)
}

#[cfg(test)]
mod tests {
    use crate::entry::{CacheEntry, Instant};
    use crate::strategy::{first_min_by, EvictionStrategy, Strategy, StrategyKind, StrategyOptions};
    use std::time::Duration;

    #[test]
    fn strategies_are_built_by_kind() {
        let options = StrategyOptions::default();
        for kind in [
            StrategyKind::Ttl,
            StrategyKind::Lru,
            StrategyKind::Lfu,
            StrategyKind::Fifo,
            StrategyKind::Hybrid,
            StrategyKind::Adaptive,
        ] {
            let strategy = Strategy::new(kind, &options);
            assert_eq!(strategy.kind(), kind);
            assert_eq!(strategy.name(), kind.name());
        }
    }

    #[test]
    fn unknown_names_fall_back_to_ttl() {
        assert_eq!(StrategyKind::parse("mru"), StrategyKind::Ttl);
        assert_eq!(StrategyKind::parse(""), StrategyKind::Ttl);
        assert_eq!(StrategyKind::parse(" Hybrid "), StrategyKind::Hybrid);
    }

    #[test]
    fn options_are_passed_to_the_strategy() {
        let options = StrategyOptions {
            ttl: Some(Duration::from_millis(100)),
            ..StrategyOptions::default()
        };
        let strategy = Strategy::new(StrategyKind::Ttl, &options);
        let now = Instant::now();
        let entry = CacheEntry::new("a", 1, None, None, now);

        assert_eq!(
            strategy.should_evict(&entry, now + Duration::from_millis(101)),
            true
        );
        assert_eq!(
            strategy.should_evict(&entry, now + Duration::from_millis(99)),
            false
        );
    }

    #[test]
    fn first_min_by_keeps_the_first_of_equal_candidates() {
        let now = Instant::now();
        let a = CacheEntry::new("a", 1, None, None, now);
        let b = CacheEntry::new("b", 1, None, None, now);
        let c = CacheEntry::new("c", 0, None, None, now);

        assert_eq!(first_min_by(&[&a, &b], |e| e.value).unwrap().key, "a");
        assert_eq!(first_min_by(&[&a, &b, &c], |e| e.value).unwrap().key, "c");
        let empty: [&CacheEntry<i32>; 0] = [];
        assert_eq!(first_min_by(&empty, |e| e.value).is_none(), true);
    }
}
