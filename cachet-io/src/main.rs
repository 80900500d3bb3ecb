use std::time::Duration;

use cachet::settings::CacheSettings;
use cachet::shared::SharedCache;

/// The interval in which the statistics of the cache are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() {
    cachet::init_logging();
    log::info!(
        "Cachet IO (v {} - rev {}) running on {} CPUs",
        cachet::CACHET_VERSION,
        cachet::CACHET_REVISION,
        num_cpus::get()
    );

    // Load the config and build the cache from its "cache" section...
    let config = cachet::config::install("config/settings.yml").await;
    let settings = match CacheSettings::from_yaml(config.current().query("cache")) {
        Ok(settings) => settings,
        Err(error) => {
            log::error!(
                "Invalid cache settings ({:#}). Starting with the defaults...",
                error
            );
            CacheSettings::default()
        }
    };
    log::info!("Creating cache ({})...", settings.describe());

    let cache: SharedCache<String> = SharedCache::new(settings.clone());
    let _config_watcher = cache.watch_config(&config);
    let mut cleanup_interval = settings.cleanup_interval;
    let mut maintenance = cachet::maintenance::spawn(cache.clone(), cleanup_interval);

    let mut config_changed = config.notifier();
    let mut stats_interval = tokio::time::interval(STATS_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Received CTRL-C. Shutting down...");
                break;
            }
            _ = config_changed.recv() => {
                // The watcher applies the settings to the cache, we only have to follow a changed
                // cleanup interval...
                let next_interval = CacheSettings::from_yaml(config.current().query("cache"))
                    .map(|settings| settings.cleanup_interval)
                    .unwrap_or(cleanup_interval);
                if next_interval != cleanup_interval {
                    maintenance.stop().await;
                    cleanup_interval = next_interval;
                    maintenance = cachet::maintenance::spawn(cache.clone(), cleanup_interval);
                }
            }
            _ = stats_interval.tick() => {
                log::info!("Cache statistics:\n{}", cache.stats());
            }
        }
    }

    maintenance.stop().await;
    log::info!("Final cache statistics:\n{}", cache.stats());
}
