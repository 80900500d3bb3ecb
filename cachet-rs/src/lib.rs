//! Cachet is an in-process cache with pluggable eviction strategies.
//!
//! # Introduction
//! Many applications repeatedly compute or fetch the same data: lookups against a backend,
//! rendered fragments or the results of expensive calculations. **Cachet** keeps these values
//! in memory, keyed by a string, and decides which values to drop once they become stale or once
//! the cache runs full.
//!
//! The decision which entry to drop is left to a [strategy](strategy). Six strategies are
//! provided: time to live, least recently used, a minimal access count, first in first out, a
//! hybrid of time to live and least recently used and an adaptive strategy which switches
//! between those two based on the observed hit rate.
//!
//! # Features
//! * **Tag based invalidation**: entries can be stored with a set of tags, so that all entries
//!   of a tag can be dropped at once. Entries can also be dropped by a common key prefix.
//! * **Capacity and memory constraints**: a cache holds at most **max_size** entries. Entries
//!   can carry an explicit size which is accounted against **max_memory**.
//! * **Statistics**: hits, misses and evictions are recorded and can be rendered as a report.
//! * **Shared access**: a [SharedCache](shared::SharedCache) is a cloneable handle which can be
//!   passed around to all tasks and threads which require caching. There is no global instance.
//! * **Memoization**: a [Memoizer](memo::Memoizer) serves async computations from the cache and
//!   ensures that only one computation per key runs at a time.
//! * **Reload-aware config**: the [settings](settings) can be read from a YAML
//!   [config](config) which is observed for changes. A changed config is applied to a running
//!   cache without losing its contents.
//! * **Maintenance**: a background task [sweeps](maintenance) stale entries periodically.
//!
//! # Modules
//! * [manager]: the cache itself.
//! * [strategy]: the eviction strategies.
//! * [entry]: the unit of storage along with its metadata.
//! * [shared] and [memo]: sharing a cache and memoizing computations.
//! * [settings], [config] and [fmt]: settings, config handling and parsing helpers.
//! * [maintenance]: periodic cleanup.
//!
//! # Examples
//! ```
//! # use cachet::manager::SetOptions;
//! # use cachet::settings::CacheSettings;
//! # use cachet::shared::SharedCache;
//! # use cachet::strategy::StrategyKind;
//! let cache = SharedCache::new(CacheSettings {
//!     max_size: 128,
//!     strategy: StrategyKind::Lru,
//!     ..CacheSettings::default()
//! });
//!
//! cache.set("user:1", "Alice".to_owned(), SetOptions::new().with_tag("users"));
//! assert_eq!(cache.get("user:1"), Some("Alice".to_owned()));
//!
//! assert_eq!(cache.invalidate_by_tag("users"), 1);
//! assert_eq!(cache.get("user:1"), None);
//! ```
//!
//! A complete example of a running instance can be found in **cachet-io**.
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod config;
pub mod entry;
pub mod fmt;
pub mod maintenance;
pub mod manager;
pub mod memo;
pub mod settings;
pub mod shared;
pub mod strategy;

/// Contains the version of the Cachet library.
pub const CACHET_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Cachet build being used.
pub const CACHET_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// This can safely be called several times, only the first call has an effect.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the integration tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

#[cfg(test)]
mod testing {
    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }
}
