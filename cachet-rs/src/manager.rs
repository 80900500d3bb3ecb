//! Provides the cache itself.
//!
//! A [CacheManager](CacheManager) stores values by key, keeps a tag index to invalidate groups
//! of entries at once and records statistics. All decisions on whether an entry is stale or
//! which entry has to make room for another one are made by its [strategy](crate::strategy).
//!
//! Entries leave the cache in several ways:
//! * explicitly via [delete](CacheManager::delete), [clear](CacheManager::clear) or one of the
//!   invalidation functions,
//! * lazily, once a read detects that the strategy considers an entry stale,
//! * proactively, by calling [cleanup](CacheManager::cleanup) (or
//!   [optimize](CacheManager::optimize)) which sweeps all stale entries,
//! * when a write hits either **max_size** or **max_memory**.
//!
//! Only lazy expiration, sweeping and the constraint enforcement are counted as evictions.
//!
//! Note that the manager itself is a plain single owner data structure. Use a
//! [SharedCache](crate::shared::SharedCache) to share a cache between tasks or threads.
//!
//! # Examples
//! ```
//! # use cachet::manager::{CacheManager, SetOptions};
//! # use cachet::settings::CacheSettings;
//! let mut cache = CacheManager::new(CacheSettings::default());
//!
//! cache.set("user:1", "Alice".to_owned(), SetOptions::new().with_tag("users"));
//! cache.set("user:2", "Bob".to_owned(), SetOptions::new().with_tag("users"));
//! assert_eq!(cache.get("user:1"), Some(&"Alice".to_owned()));
//!
//! // Drop all users at once...
//! assert_eq!(cache.invalidate_by_tag("users"), 2);
//! assert_eq!(cache.get("user:2"), None);
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits, 1);
//! assert_eq!(stats.misses, 1);
//! ```
use std::fmt;
use std::fmt::Display;
use std::time::Duration;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;

use crate::entry::{CacheEntry, Instant};
use crate::fmt::{format_duration, format_size};
use crate::settings::CacheSettings;
use crate::strategy::{EvictionStrategy, Strategy};

/// Contains the optional parameters of [CacheManager::set](CacheManager::set).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overrides the default time to live of the strategy for this entry.
    pub ttl: Option<Duration>,
    /// Tags under which the entry is registered for bulk invalidation.
    pub tags: Vec<String>,
    /// The size in bytes which is accounted against **max_memory**.
    pub size: Option<usize>,
}

impl SetOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        SetOptions::default()
    }

    /// Specifies a time to live for the entry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Adds a tag to the entry.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds all given tags to the entry.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Specifies the size of the entry in bytes.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

/// Represents a snapshot of the statistics of a cache.
///
/// Use the **Display** implementation to render a human readable report.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheStats {
    /// The number of entries in the cache.
    pub size: usize,
    /// The number of successful reads.
    pub hits: u64,
    /// The number of reads which didn't yield a value.
    pub misses: u64,
    /// The ratio of hits to all reads (0..=1) or 0 if there were no reads at all.
    pub hit_rate: f64,
    /// The number of entries removed because they were stale or had to make room.
    pub evictions: u64,
    /// The sum of all explicit entry sizes in bytes.
    pub memory_usage: usize,
    /// The creation instant of the oldest entry.
    pub oldest_entry: Option<Instant>,
    /// The creation instant of the newest entry.
    pub newest_entry: Option<Instant>,
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let now = Instant::now();
        let age = |instant: Option<Instant>| match instant {
            Some(instant) => format_duration(now.duration_since(instant)),
            None => "-".to_owned(),
        };

        writeln!(f, "{:<30} {:>20}", "Num Entries", self.size)?;
        writeln!(f, "{:<30} {:>20}", "Hits", self.hits)?;
        writeln!(f, "{:<30} {:>20}", "Misses", self.misses)?;
        writeln!(f, "{:<30} {:>18.2} %", "Hit Rate", self.hit_rate * 100.)?;
        writeln!(f, "{:<30} {:>20}", "Evictions", self.evictions)?;
        writeln!(
            f,
            "{:<30} {:>20}",
            "Memory Usage",
            format_size(self.memory_usage)
        )?;
        writeln!(f, "{:<30} {:>20}", "Age of Oldest Entry", age(self.oldest_entry))?;
        writeln!(f, "{:<30} {:>20}", "Age of Newest Entry", age(self.newest_entry))
    }
}

/// Reports the outcome of [CacheManager::optimize](CacheManager::optimize).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OptimizeReport {
    /// The number of stale entries which have been removed.
    pub cleaned_up: usize,
    /// The number of entries which are still in the cache.
    pub remaining: usize,
}

/// Provides a key value cache with pluggable eviction strategies and tag based invalidation.
///
/// See the [module documentation](crate::manager) for an overview.
pub struct CacheManager<V> {
    entries: LinkedHashMap<String, CacheEntry<V>>,
    tags: FnvHashMap<String, FnvHashSet<String>>,
    entry_tags: FnvHashMap<String, Vec<String>>,
    strategy: Strategy,
    settings: CacheSettings,
    allocated_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> Default for CacheManager<V> {
    fn default() -> Self {
        CacheManager::new(CacheSettings::default())
    }
}

impl<V> CacheManager<V> {
    /// Creates a new and empty cache using the given settings.
    ///
    /// A **max_size** of zero is bumped to one, as the cache must be able to hold at least the
    /// entry being written.
    pub fn new(settings: CacheSettings) -> Self {
        let settings = sanitize(settings);
        CacheManager {
            entries: LinkedHashMap::new(),
            tags: FnvHashMap::default(),
            entry_tags: FnvHashMap::default(),
            strategy: Strategy::new(settings.strategy, &settings.strategy_options),
            settings,
            allocated_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Returns the value stored for the given key.
    ///
    /// Returns **None** if either no entry exists or if the strategy considers the entry stale.
    /// In the latter case, the entry is removed right away. A successful read is reported to the
    /// strategy (which might update the metadata of the entry) and moves the entry to the end
    /// of the iteration order.
    ///
    /// # Examples
    /// ```
    /// # use cachet::manager::{CacheManager, SetOptions};
    /// let mut cache = CacheManager::default();
    /// cache.set("Foo", 42, SetOptions::new());
    ///
    /// assert_eq!(cache.get("Foo"), Some(&42));
    /// assert_eq!(cache.get("Bar"), None);
    /// ```
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let now = Instant::now();
        let stale = self
            .entries
            .get(key)
            .map(|entry| self.strategy.should_evict(entry, now));

        match stale {
            None => {
                self.record_read(false);
                None
            }
            Some(true) => {
                let _ = self.remove_entry(key);
                self.record_read(false);
                self.record_evictions(1);
                None
            }
            Some(false) => {
                self.record_read(true);
                let entry = self.entries.get_refresh(key)?;
                self.strategy.on_access(entry, now);
                Some(&entry.value)
            }
        }
    }

    /// Stores the given value for the given key.
    ///
    /// An existing entry for the key is replaced (and its tags are discarded). If the key is new
    /// and the cache is full, the strategy selects an entry which is evicted to make room.
    ///
    /// An entry which is larger than **max_memory** all by itself is not stored at all. Otherwise
    /// further entries are evicted until the accounted memory fits again.
    ///
    /// # Examples
    /// ```
    /// # use cachet::manager::{CacheManager, SetOptions};
    /// # use cachet::settings::CacheSettings;
    /// # use std::time::Duration;
    /// let mut cache = CacheManager::new(CacheSettings {
    ///     max_size: 2,
    ///     ..CacheSettings::default()
    /// });
    ///
    /// cache.set("a", 1, SetOptions::new());
    /// cache.set("b", 2, SetOptions::new().with_ttl(Duration::from_secs(10)).with_tag("numbers"));
    /// cache.set("c", 3, SetOptions::new());
    ///
    /// assert_eq!(cache.len(), 2);
    /// assert_eq!(cache.stats().evictions, 1);
    /// ```
    pub fn set(&mut self, key: impl Into<String>, value: V, options: SetOptions) {
        let key = key.into();
        let now = Instant::now();
        let replaced = self.remove_entry(&key).is_some();

        if let Some(size) = options.size {
            if size > self.settings.max_memory {
                log::warn!(
                    "Not caching '{}' as its size ({}) exceeds the max memory of the cache ({}).",
                    key,
                    format_size(size),
                    format_size(self.settings.max_memory)
                );
                return;
            }
        }

        if !replaced && self.entries.len() >= self.settings.max_size {
            let _ = self.evict_one(now);
        }

        let entry = CacheEntry::new(key.clone(), value, options.ttl, options.size, now);
        self.allocated_memory += entry.accounted_size();
        self.register_tags(&key, options.tags);
        let _ = self.entries.insert(key, entry);

        self.enforce_constraints(now);
    }

    /// Determines if a live entry exists for the given key.
    ///
    /// Just like [get](CacheManager::get) this removes a stale entry. However, this neither
    /// counts a hit or miss nor does it notify the strategy about an access.
    pub fn has(&mut self, key: &str) -> bool {
        let now = Instant::now();
        match self
            .entries
            .get(key)
            .map(|entry| self.strategy.should_evict(entry, now))
        {
            Some(false) => true,
            Some(true) => {
                let _ = self.remove_entry(key);
                false
            }
            None => false,
        }
    }

    /// Returns the entry for the given key without any side effects.
    ///
    /// In contrast to [get](CacheManager::get) this doesn't check if the entry is stale,
    /// doesn't count any statistics and doesn't touch the metadata of the entry.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Removes the entry for the given key.
    ///
    /// Returns **true** if an entry was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Removes all entries along with all tags.
    ///
    /// Note that the statistics are kept. Use [reset_stats](CacheManager::reset_stats) to
    /// zero them.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
        self.entry_tags.clear();
        self.allocated_memory = 0;
    }

    /// Removes all entries which have been stored with the given tag.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate_by_tag(&mut self, tag: &str) -> usize {
        let keys = match self.tags.remove(tag) {
            Some(keys) => keys,
            None => return 0,
        };

        let mut count = 0;
        for key in keys {
            if self.remove_entry(&key).is_some() {
                count += 1;
            }
        }

        count
    }

    /// Removes all entries whose key starts with the given prefix.
    ///
    /// Returns the number of removed entries.
    ///
    /// # Examples
    /// ```
    /// # use cachet::manager::{CacheManager, SetOptions};
    /// let mut cache = CacheManager::default();
    /// cache.set("user:1", 1, SetOptions::new());
    /// cache.set("user:2", 2, SetOptions::new());
    /// cache.set("order:1", 3, SetOptions::new());
    ///
    /// assert_eq!(cache.invalidate_by_prefix("user:"), 2);
    /// assert_eq!(cache.keys(), vec!["order:1".to_owned()]);
    /// ```
    pub fn invalidate_by_prefix(&mut self, prefix: &str) -> usize {
        let keys = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect::<Vec<_>>();

        for key in &keys {
            let _ = self.remove_entry(key);
        }

        keys.len()
    }

    /// Removes all entries which are considered stale by the strategy.
    ///
    /// Returns the number of removed entries, which are also counted as evictions.
    pub fn cleanup(&mut self) -> usize {
        let now = Instant::now();
        let stale = self
            .entries
            .values()
            .filter(|entry| self.strategy.should_evict(entry, now))
            .map(|entry| entry.key.clone())
            .collect::<Vec<_>>();

        for key in &stale {
            let _ = self.remove_entry(key);
        }

        self.record_evictions(stale.len());
        stale.len()
    }

    /// Performs a [cleanup](CacheManager::cleanup) and reports how many entries are left.
    pub fn optimize(&mut self) -> OptimizeReport {
        let cleaned_up = self.cleanup();
        OptimizeReport {
            cleaned_up,
            remaining: self.entries.len(),
        }
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> CacheStats {
        let reads = self.hits + self.misses;
        CacheStats {
            size: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            hit_rate: if reads == 0 {
                0.
            } else {
                self.hits as f64 / reads as f64
            },
            evictions: self.evictions,
            memory_usage: self.allocated_memory,
            oldest_entry: self.entries.values().map(|entry| entry.timestamp).min(),
            newest_entry: self.entries.values().map(|entry| entry.timestamp).max(),
        }
    }

    /// Zeros the counters for hits, misses and evictions.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    /// Returns all keys in their iteration order (least recently stored or read first).
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Returns all keys registered for the given tag in ascending order.
    pub fn keys_by_tag(&self, tag: &str) -> Vec<String> {
        self.tags
            .get(tag)
            .map(|keys| keys.iter().cloned().sorted().collect())
            .unwrap_or_default()
    }

    /// Returns all known tags in ascending order.
    pub fn tags(&self) -> Vec<String> {
        self.tags.keys().cloned().sorted().collect()
    }

    /// Returns the number of entries in the cache.
    ///
    /// Note that this might include stale entries which haven't been detected yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determines if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the settings in effect.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Returns the active strategy.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Applies new settings while keeping all entries.
    ///
    /// If the strategy or its options changed, a fresh strategy is installed. If the cache got
    /// smaller, entries are evicted right away until the new limits are met.
    pub fn reconfigure(&mut self, settings: CacheSettings) {
        let settings = sanitize(settings);

        if settings.strategy != self.settings.strategy
            || settings.strategy_options != self.settings.strategy_options
        {
            log::info!(
                "Switching the cache strategy from '{}' to '{}' ({:?}).",
                self.settings.strategy,
                settings.strategy,
                settings.strategy_options
            );
            self.strategy = Strategy::new(settings.strategy, &settings.strategy_options);
        }

        if settings.max_size != self.settings.max_size {
            log::info!(
                "Updating max_size of the cache from {} to {}.",
                self.settings.max_size,
                settings.max_size
            );
        }

        if settings.max_memory != self.settings.max_memory {
            log::info!(
                "Updating max_memory of the cache from {} to {}.",
                format_size(self.settings.max_memory),
                format_size(settings.max_memory)
            );
        }

        if settings.enable_stats != self.settings.enable_stats {
            log::info!(
                "{} statistics of the cache.",
                if settings.enable_stats {
                    "Enabling"
                } else {
                    "Disabling"
                }
            );
        }

        if settings.cleanup_interval != self.settings.cleanup_interval {
            log::info!(
                "Updating cleanup_interval of the cache from {} to {}.",
                format_duration(self.settings.cleanup_interval),
                format_duration(settings.cleanup_interval)
            );
        }

        let shrinking = settings.max_size < self.settings.max_size
            || settings.max_memory < self.settings.max_memory;
        self.settings = settings;

        if shrinking {
            self.enforce_constraints(Instant::now());
        }
    }

    fn record_read(&mut self, hit: bool) {
        self.strategy.record_access(hit);
        if self.settings.enable_stats {
            if hit {
                self.hits += 1;
            } else {
                self.misses += 1;
            }
        }
    }

    fn record_evictions(&mut self, count: usize) {
        if self.settings.enable_stats {
            self.evictions += count as u64;
        }
    }

    fn register_tags(&mut self, key: &str, tags: Vec<String>) {
        let tags = tags.into_iter().unique().collect::<Vec<_>>();
        if tags.is_empty() {
            return;
        }

        for tag in &tags {
            let _ = self
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_owned());
        }
        let _ = self.entry_tags.insert(key.to_owned(), tags);
    }

    /// Removes the entry and scrubs it from the tag index.
    ///
    /// Every removal has to go through here so that the tag index never references a key
    /// which isn't present anymore.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.allocated_memory = self.allocated_memory.saturating_sub(entry.accounted_size());

        if let Some(tags) = self.entry_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tags.get_mut(&tag) {
                    let _ = keys.remove(key);
                    if keys.is_empty() {
                        let _ = self.tags.remove(&tag);
                    }
                }
            }
        }

        Some(entry)
    }

    /// Asks the strategy for a victim and evicts it.
    ///
    /// Returns **false** if there was nothing to evict.
    fn evict_one(&mut self, now: Instant) -> bool {
        let victim = {
            let candidates = self.entries.values().collect::<Vec<_>>();
            self.strategy
                .select_for_eviction(&candidates, now)
                .map(|entry| entry.key.clone())
        };

        match victim {
            Some(key) => {
                log::debug!(
                    "Evicting '{}' from the cache (strategy: {}).",
                    key,
                    self.strategy.name()
                );
                let _ = self.remove_entry(&key);
                self.record_evictions(1);
                true
            }
            None => false,
        }
    }

    fn enforce_constraints(&mut self, now: Instant) {
        while self.entries.len() > self.settings.max_size
            || self.allocated_memory > self.settings.max_memory
        {
            if !self.evict_one(now) {
                return;
            }
        }
    }
}

fn sanitize(mut settings: CacheSettings) -> CacheSettings {
    if settings.max_size == 0 {
        log::warn!("A cache needs a max_size of at least 1. Using 1 instead of 0.");
        settings.max_size = 1;
    }

    settings
}
