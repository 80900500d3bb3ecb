//! Contains the settings which control a [CacheManager](crate::manager::CacheManager).
//!
//! Settings can either be built in code (starting from [CacheSettings::default]) or be read
//! from the **cache** section of the YAML config:
//!
//! ```yaml
//! cache:
//!   max_size: 1000
//!   max_memory: 50m
//!   strategy: hybrid
//!   ttl: 5m
//!   max_age: 30m
//!   min_access_count: 2
//!   enable_stats: true
//!   cleanup_interval: 1m
//! ```
//!
//! Sizes accept the suffixes understood by [parse_size](crate::fmt::parse_size), durations the
//! ones understood by [parse_duration](crate::fmt::parse_duration). Plain integers are taken as
//! bytes or milliseconds respectively. Each missing key keeps its default.
use std::time::Duration;

use anyhow::Context;
use yaml_rust::Yaml;

use crate::fmt::{format_duration, format_size, parse_duration, parse_size};
use crate::strategy::{StrategyKind, StrategyOptions};

/// The default max number of entries in a cache.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// The default max memory (50 MiB) which may be accounted by the entries of a cache.
pub const DEFAULT_MAX_MEMORY: usize = 50 * 1024 * 1024;

/// The default interval in which the maintenance job cleans up stale entries.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Describes the shape and behaviour of a cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheSettings {
    /// The max number of entries to keep.
    pub max_size: usize,
    /// The max number of bytes which may be accounted by entries with an explicit size.
    pub max_memory: usize,
    /// The eviction strategy to use.
    pub strategy: StrategyKind,
    /// The tuning parameters of the strategy.
    pub strategy_options: StrategyOptions,
    /// Determines if hits, misses and evictions are counted.
    pub enable_stats: bool,
    /// The interval in which the maintenance job should sweep stale entries.
    pub cleanup_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            max_size: DEFAULT_MAX_SIZE,
            max_memory: DEFAULT_MAX_MEMORY,
            strategy: StrategyKind::Hybrid,
            strategy_options: StrategyOptions::default(),
            enable_stats: true,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheSettings {
    /// Reads the settings from the given YAML element (most probably the **cache** section of
    /// the config).
    ///
    /// A missing section yields the default settings.
    ///
    /// # Errors
    /// Fails if the section isn't an object or if any of the given values cannot be parsed. In
    /// this case no partial settings are returned.
    ///
    /// # Examples
    /// ```
    /// # use cachet::settings::CacheSettings;
    /// # use cachet::strategy::StrategyKind;
    /// # use yaml_rust::YamlLoader;
    /// let docs = YamlLoader::load_from_str("
    /// cache:
    ///     max_size: 128
    ///     max_memory: 1m
    ///     strategy: lru
    /// ").unwrap();
    ///
    /// let settings = CacheSettings::from_yaml(&docs[0]["cache"]).unwrap();
    /// assert_eq!(settings.max_size, 128);
    /// assert_eq!(settings.max_memory, 1024 * 1024);
    /// assert_eq!(settings.strategy, StrategyKind::Lru);
    /// assert_eq!(settings.enable_stats, true);
    /// ```
    pub fn from_yaml(section: &Yaml) -> anyhow::Result<Self> {
        let mut settings = CacheSettings::default();
        match section {
            Yaml::BadValue | Yaml::Null => return Ok(settings),
            Yaml::Hash(_) => (),
            _ => return Err(anyhow::anyhow!("The cache settings must be an object.")),
        }

        if let Some(max_size) = read_integer(section, "max_size")? {
            if max_size == 0 {
                return Err(anyhow::anyhow!("'max_size' must be greater than zero."));
            }
            settings.max_size = max_size as usize;
        }

        if let Some(max_memory) = read_size(section, "max_memory")? {
            settings.max_memory = max_memory;
        }

        match &section["strategy"] {
            Yaml::BadValue | Yaml::Null => (),
            Yaml::String(name) => settings.strategy = StrategyKind::parse(name),
            other => {
                return Err(anyhow::anyhow!(
                    "Invalid value for 'strategy': {:?}",
                    other
                ))
            }
        }

        settings.strategy_options.ttl = read_duration(section, "ttl")?;
        settings.strategy_options.max_age = read_duration(section, "max_age")?;
        settings.strategy_options.min_access_count = read_integer(section, "min_access_count")?;

        match &section["enable_stats"] {
            Yaml::BadValue | Yaml::Null => (),
            Yaml::Boolean(flag) => settings.enable_stats = *flag,
            other => {
                return Err(anyhow::anyhow!(
                    "Invalid value for 'enable_stats': {:?}",
                    other
                ))
            }
        }

        if let Some(interval) = read_duration(section, "cleanup_interval")? {
            if interval.is_zero() {
                return Err(anyhow::anyhow!(
                    "'cleanup_interval' must be greater than zero."
                ));
            }
            settings.cleanup_interval = interval;
        }

        Ok(settings)
    }

    /// Returns a short one-line summary of these settings, intended for log messages.
    pub fn describe(&self) -> String {
        format!(
            "max_size: {}, max_memory: {}, strategy: {}, stats: {}, cleanup: {}",
            self.max_size,
            format_size(self.max_memory),
            self.strategy,
            if self.enable_stats { "on" } else { "off" },
            format_duration(self.cleanup_interval)
        )
    }
}

fn read_integer(section: &Yaml, key: &str) -> anyhow::Result<Option<u64>> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(value) => u64::try_from(*value)
            .map(Some)
            .map_err(|_| anyhow::anyhow!("'{}' must not be negative.", key)),
        other => Err(anyhow::anyhow!("Invalid value for '{}': {:?}", key, other)),
    }
}

fn read_size(section: &Yaml, key: &str) -> anyhow::Result<Option<usize>> {
    match &section[key] {
        Yaml::String(expression) => parse_size(expression)
            .map(Some)
            .with_context(|| format!("Failed to parse '{}'", key)),
        _ => Ok(read_integer(section, key)?.map(|value| value as usize)),
    }
}

fn read_duration(section: &Yaml, key: &str) -> anyhow::Result<Option<Duration>> {
    match &section[key] {
        Yaml::String(expression) => parse_duration(expression)
            .map(Some)
            .with_context(|| format!("Failed to parse '{}'", key)),
        _ => Ok(read_integer(section, key)?.map(Duration::from_millis)),
    }
}
