//! Contains the application configuration.
//!
//! Provides access to a YAML config file (**config/settings.yml** when using [install]). The
//! file is observed for changes and reloaded once a change is detected. Therefore each user of
//! the config should attach itself to [Config::notifier](Config::notifier) and re-process the
//! config once a change message is received. A [SharedCache](crate::shared::SharedCache) does
//! exactly this via [watch_config](crate::shared::SharedCache::watch_config).
//!
//! Note that the **Config** itself can be kept around. However, a [Handle] obtained via
//! [Config::current](Config::current) should not be stored, as it will not be updated once a new
//! config has been loaded.
//!
//! # Examples
//!
//! Reading the config:
//! ```
//! # use cachet::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! cache:
//!     max_size: 512
//! ", None).unwrap();
//!
//! // Fetch the current config document (might be reloaded from time to time) and read the
//! // selected cache size...
//! let max_size = config.current().query("cache.max_size").as_i64().unwrap_or(1000);
//! assert_eq!(max_size, 512);
//! ```
//!
//! Attaching a change listener:
//! ```no_run
//! # use cachet::config::Config;
//! # #[tokio::main]
//! # async fn main() {
//! let config = cachet::config::install("config/settings.yml").await;
//! tokio::spawn(async move {
//!     loop {
//!         // Wait for a config change. This will most probably be combined with other events
//!         // using tokio::select!...
//!         match config.notifier().recv().await {
//!             Ok(_) => log::info!("Config update received..."),
//!             _ => return,
//!         }
//!     }
//! });
//! # }
//! ```
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

/// Provides access to the application configuration.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// Internally this is simply the receiver of a broadcast. The actual message being broadcast
/// can and should be ignored. All that matters is, once a message has been received, the config
/// was changed and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be stored or kept around for long, as it will not be updated
/// if the underlying config changed.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates a new config reading the given file.
    ///
    /// Note that this will neither load the file nor install a change listener. This is done by
    /// the [install] function.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Returns the name of the underlying file.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    ///
    /// Note that this is a fairly efficient operation but still provides some overhead. Therefore
    /// this shouldn't be placed in an inner loop.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// As within docker, the file might be presented as volume, we check that it is a file, as
    /// an unmounted docker volume is always presented as directory.
    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Forces the config to read the underlying file.
    ///
    /// A missing file isn't considered an error, as all users of the config are expected to
    /// fall back to sane defaults.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                log::info!(
                    "Config file {} doesn't exist or is an unmounted docker volume - skipping config load.",
                    &self.filename
                );
                return Ok(());
            }
        }

        let config_data = match tokio::fs::read_to_string(&self.filename).await {
            Ok(data) => data,
            Err(error) => {
                return Err(anyhow::anyhow!(
                    "Cannot load config file {}: {}",
                    &self.filename,
                    error
                ));
            }
        };

        let last_modified = tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        self.load_from_string(config_data.as_str(), last_modified)
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// This is intended to be used in test environments where we cannot / do not want to load
    /// a config file from disk. Note that a malformed config is rejected and the previously
    /// loaded one remains active.
    ///
    /// # Example
    ///
    /// ```
    /// # use cachet::config::Config;
    /// let config = Config::new("somefile.yml");
    /// config.load_from_string("
    /// cache:
    ///     strategy: lru
    /// ", None).unwrap();
    ///
    /// assert_eq!(config.current().query("cache.strategy").as_str().unwrap(), "lru");
    /// ```
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let mut docs = match YamlLoader::load_from_str(data) {
            Ok(docs) => docs,
            Err(error) => {
                return Err(anyhow::anyhow!(
                    "Cannot parse config file {}: {}",
                    &self.filename,
                    error
                ));
            }
        };

        let doc = if docs.is_empty() {
            Yaml::Null
        } else {
            docs.swap_remove(0)
        };

        // Store update config...
        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the currently loaded configuration.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Resolves a dotted path like `cache.max_size` against the currently loaded configuration.
    ///
    /// Yields **Yaml::BadValue** if any part of the path is missing.
    pub fn query(&self, query: impl AsRef<str>) -> &Yaml {
        query
            .as_ref()
            .split('.')
            .filter(|key| !key.is_empty())
            .fold(&self.config.0, |node, key| &node[key])
    }
}

/// Creates a **Config** for the given file, loads it and installs a change listener.
///
/// The listener only watches the "last modified" date of the file and will not perform a
/// structural comparison. Therefore it is the duty of each config user to gracefully handle
/// partial config changes. The listener stops once the returned config is dropped.
pub async fn install(file: &str) -> Arc<Config> {
    // Create the config directory in case it doesn't exist...
    if let Some(parent) = std::path::Path::new(file)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        if let Err(error) = tokio::fs::create_dir_all(parent).await {
            log::warn!(
                "Failed to create config base directory {}: {}",
                parent.to_string_lossy(),
                error
            )
        }
    }

    let config = Arc::new(Config::new(file));

    // Actually try to read the file...
    if let Err(error) = config.load().await {
        log::error!("{}", error);
    }

    // Install a change listener which runs every 2s...
    run_config_change_monitor(Arc::downgrade(&config));

    config
}

#[cfg(test)]
fn run_config_change_monitor(_config: std::sync::Weak<Config>) {
    // No automatic updates during testing...
}

#[cfg(not(test))]
fn run_config_change_monitor(config: std::sync::Weak<Config>) {
    let _ = tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            let config = match config.upgrade() {
                Some(config) => config,
                None => return,
            };

            // This will contain the last modified date of the file on disk or be None if the
            // file is absent...
            let last_modified = config.last_modified().await;

            // Contains the timestamp when the file was loaded the last time or be None if no
            // data has been loaded yet...
            let last_loaded = config.config.load().1;

            // If a file is present and newer that the one previously loaded (or if none has been
            // loaded so far) -> perform a reload and broadcast an update if the file has been
            // successfully loaded...
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => {
                        log::info!("System configuration was re-loaded.");
                    }
                    Err(error) => log::error!("Failed to re-load system config: {}", error),
                }
            }
        }
    });
}
