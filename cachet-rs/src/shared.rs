//! Provides a handle to share a cache between tasks and threads.
//!
//! There is no global cache instance. Rather the application creates a [SharedCache] once (most
//! probably during startup) and hands clones of it to each component which needs caching. All
//! clones operate on the same [CacheManager](CacheManager).
//!
//! # Examples
//! ```
//! # use cachet::manager::SetOptions;
//! # use cachet::settings::CacheSettings;
//! # use cachet::shared::SharedCache;
//! let cache = SharedCache::new(CacheSettings::default());
//! let other = cache.clone();
//!
//! cache.set("Foo", "Bar".to_owned(), SetOptions::new());
//! assert_eq!(other.get("Foo"), Some("Bar".to_owned()));
//!
//! // Compound operations can be performed under a single lock...
//! let size = other.with(|manager| {
//!     manager.set("Foo2", "Bar2".to_owned(), SetOptions::new());
//!     manager.len()
//! });
//! assert_eq!(size, 2);
//! ```
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use yaml_rust::Yaml;

use crate::config::Config;
use crate::manager::{CacheManager, CacheStats, OptimizeReport, SetOptions};
use crate::settings::CacheSettings;

/// A cloneable handle to a [CacheManager] protected by a mutex.
///
/// Each operation acquires the lock for its whole duration. Use [with](SharedCache::with) to
/// run several operations atomically.
pub struct SharedCache<V> {
    inner: Arc<Mutex<CacheManager<V>>>,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        SharedCache {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Default for SharedCache<V> {
    fn default() -> Self {
        SharedCache::new(CacheSettings::default())
    }
}

impl<V> SharedCache<V> {
    /// Creates a new cache using the given settings.
    pub fn new(settings: CacheSettings) -> Self {
        SharedCache::from_manager(CacheManager::new(settings))
    }

    /// Wraps an already existing cache.
    pub fn from_manager(manager: CacheManager<V>) -> Self {
        SharedCache {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Acquires the lock.
    ///
    /// A panic within another operation leaves the cache in a consistent state, as all
    /// operations of the manager are panic free, therefore a poisoned lock is simply recovered.
    fn lock(&self) -> MutexGuard<'_, CacheManager<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the given closure on the underlying cache while holding the lock.
    pub fn with<R>(&self, callback: impl FnOnce(&mut CacheManager<V>) -> R) -> R {
        callback(&mut self.lock())
    }

    /// Returns a copy of the value stored for the given key.
    ///
    /// See [CacheManager::get](CacheManager::get).
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.lock().get(key).cloned()
    }

    /// Stores the given value. See [CacheManager::set](CacheManager::set).
    pub fn set(&self, key: impl Into<String>, value: V, options: SetOptions) {
        self.lock().set(key, value, options)
    }

    /// See [CacheManager::has](CacheManager::has).
    pub fn has(&self, key: &str) -> bool {
        self.lock().has(key)
    }

    /// See [CacheManager::delete](CacheManager::delete).
    pub fn delete(&self, key: &str) -> bool {
        self.lock().delete(key)
    }

    /// See [CacheManager::clear](CacheManager::clear).
    pub fn clear(&self) {
        self.lock().clear()
    }

    /// See [CacheManager::invalidate_by_tag](CacheManager::invalidate_by_tag).
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.lock().invalidate_by_tag(tag)
    }

    /// See [CacheManager::invalidate_by_prefix](CacheManager::invalidate_by_prefix).
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        self.lock().invalidate_by_prefix(prefix)
    }

    /// See [CacheManager::cleanup](CacheManager::cleanup).
    pub fn cleanup(&self) -> usize {
        self.lock().cleanup()
    }

    /// See [CacheManager::optimize](CacheManager::optimize).
    pub fn optimize(&self) -> OptimizeReport {
        self.lock().optimize()
    }

    /// See [CacheManager::stats](CacheManager::stats).
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// See [CacheManager::reset_stats](CacheManager::reset_stats).
    pub fn reset_stats(&self) {
        self.lock().reset_stats()
    }

    /// See [CacheManager::keys](CacheManager::keys).
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys()
    }

    /// See [CacheManager::keys_by_tag](CacheManager::keys_by_tag).
    pub fn keys_by_tag(&self, tag: &str) -> Vec<String> {
        self.lock().keys_by_tag(tag)
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Determines if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a copy of the settings in effect.
    pub fn settings(&self) -> CacheSettings {
        self.lock().settings().clone()
    }

    /// Applies new settings while keeping all entries.
    ///
    /// See [CacheManager::reconfigure](CacheManager::reconfigure).
    pub fn reconfigure(&self, settings: CacheSettings) {
        self.lock().reconfigure(settings)
    }

    /// Replaces the underlying cache by a fresh and empty one.
    ///
    /// All entries and statistics are discarded. Every clone of this handle observes the new
    /// cache.
    pub fn rebuild(&self, settings: CacheSettings) {
        log::info!("Rebuilding cache ({})...", settings.describe());
        *self.lock() = CacheManager::new(settings);
    }

    /// Applies the **cache** section of the given config and re-applies it whenever the config
    /// changes.
    ///
    /// A config without a **cache** section leaves the cache untouched. The same applies to an
    /// invalid section, which is only logged. The returned task ends once either the config or
    /// all handles of this cache have been dropped.
    pub fn watch_config(&self, config: &Arc<Config>) -> tokio::task::JoinHandle<()>
    where
        V: Send + 'static,
    {
        // Subscribe before the first apply, so that no reload is missed.
        let mut notifier = config.notifier();
        self.apply_config(config);

        let config = Arc::downgrade(config);
        let cache = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match notifier.recv().await {
                    Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => (),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }

                match (config.upgrade(), cache.upgrade()) {
                    (Some(config), Some(inner)) => SharedCache { inner }.apply_config(&config),
                    _ => return,
                }
            }
        })
    }

    fn apply_config(&self, config: &Config) {
        let handle = config.current();
        let section = handle.query("cache");
        if let Yaml::BadValue | Yaml::Null = section {
            log::info!("Config does not contain a 'cache' object. Skipping config update.");
            return;
        }

        match CacheSettings::from_yaml(section) {
            Ok(settings) => self.reconfigure(settings),
            Err(error) => log::error!(
                "Not going to update the cache. Failed to parse the 'cache' section: {:#}",
                error
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::manager::SetOptions;
    use crate::settings::CacheSettings;
    use crate::shared::SharedCache;
    use crate::strategy::StrategyKind;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn clones_share_the_same_cache() {
        let cache = SharedCache::default();
        let clone = cache.clone();

        cache.set("a", 1, SetOptions::new().with_tag("t"));
        assert_eq!(clone.get("a"), Some(1));
        assert_eq!(clone.has("a"), true);
        assert_eq!(clone.keys_by_tag("t"), vec!["a"]);
        assert_eq!(clone.invalidate_by_tag("t"), 1);
        assert_eq!(cache.is_empty(), true);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn threads_can_share_a_cache() {
        let cache = SharedCache::default();
        let threads = (0..4)
            .map(|thread| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for index in 0..100 {
                        cache.set(format!("{}-{}", thread, index), index, SetOptions::new());
                    }
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(cache.len(), 400);
    }

    #[test]
    fn a_poisoned_lock_is_recovered() {
        let cache = SharedCache::default();
        cache.set("a", 1, SetOptions::new());

        let clone = cache.clone();
        let result = std::thread::spawn(move || {
            clone.with(|_| panic!("Failure within a compound operation"));
        })
        .join();
        assert_eq!(result.is_err(), true);

        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn rebuild_starts_over() {
        let cache = SharedCache::default();
        cache.set("a", 1, SetOptions::new());
        let _ = cache.get("a");

        cache.rebuild(CacheSettings {
            max_size: 10,
            ..CacheSettings::default()
        });

        assert_eq!(cache.is_empty(), true);
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.settings().max_size, 10);
    }

    #[test]
    fn config_changes_are_applied() {
        crate::testing::test_async(async {
            let config = Arc::new(Config::new("unused.yml"));
            config
                .load_from_string("cache:\n    max_size: 3\n    strategy: lru", None)
                .unwrap();

            let cache: SharedCache<i32> = SharedCache::default();
            for index in 0..5 {
                cache.set(format!("k{}", index), index, SetOptions::new());
            }
            let _watcher = cache.watch_config(&config);

            // The current config is applied right away...
            assert_eq!(cache.settings().max_size, 3);
            assert_eq!(cache.settings().strategy, StrategyKind::Lru);
            assert_eq!(cache.len(), 3);

            // An invalid section is ignored...
            config
                .load_from_string("cache:\n    max_size: many", None)
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(cache.settings().max_size, 3);

            // A valid update is picked up...
            config
                .load_from_string("cache:\n    max_size: 2\n    strategy: fifo", None)
                .unwrap();
            for _ in 0..100 {
                if cache.settings().max_size == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(cache.settings().max_size, 2);
            assert_eq!(cache.settings().strategy, StrategyKind::Fifo);
            assert_eq!(cache.len(), 2);
        });
    }

    #[test]
    fn a_reload_right_after_watching_is_not_missed() {
        crate::testing::test_async(async {
            let config = Arc::new(Config::new("unused.yml"));
            config
                .load_from_string("cache:\n    max_size: 5", None)
                .unwrap();

            let cache: SharedCache<i32> = SharedCache::default();
            let _watcher = cache.watch_config(&config);
            assert_eq!(cache.settings().max_size, 5);

            // The watcher task didn't get a chance to run yet...
            config
                .load_from_string("cache:\n    max_size: 4", None)
                .unwrap();
            for _ in 0..100 {
                if cache.settings().max_size == 4 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(cache.settings().max_size, 4);
        });
    }
}
