//! Runs the periodic cleanup of a cache.
//!
//! Stale entries are removed lazily once they are read. Entries which are never read again
//! would stay around until they are evicted to make room. Therefore [spawn] starts a task which
//! calls [optimize](crate::shared::SharedCache::optimize) in a fixed interval.
//!
//! # Examples
//! ```no_run
//! # use cachet::shared::SharedCache;
//! # use std::time::Duration;
//! # #[tokio::main]
//! # async fn main() {
//! let cache: SharedCache<String> = SharedCache::default();
//! let maintenance = cachet::maintenance::spawn(cache.clone(), Duration::from_secs(60));
//!
//! // ... use the cache ...
//!
//! maintenance.stop().await;
//! # }
//! ```
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::shared::SharedCache;

/// Represents a running maintenance task.
///
/// The task is stopped by either calling [stop](Maintenance::stop) or by dropping this handle.
pub struct Maintenance {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Starts a task which sweeps stale entries of the given cache every **interval**.
pub fn spawn<V: Send + 'static>(cache: SharedCache<V>, interval: Duration) -> Maintenance {
    let interval = interval.max(Duration::from_millis(1));
    let (stop, mut stop_signal) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        log::debug!(
            "Starting cache maintenance (interval: {})...",
            crate::fmt::format_duration(interval)
        );

        loop {
            tokio::select! {
                _ = &mut stop_signal => {
                    log::debug!("Stopping cache maintenance...");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    let report = cache.optimize();
                    if report.cleaned_up > 0 {
                        log::debug!(
                            "Cache maintenance removed {} stale entries ({} remaining).",
                            report.cleaned_up,
                            report.remaining
                        );
                    }
                }
            }
        }
    });

    Maintenance {
        stop: Some(stop),
        task: Some(task),
    }
}

impl Maintenance {
    /// Stops the task and waits until it has terminated.
    pub async fn stop(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                log::error!("Cache maintenance terminated abnormally: {}", error);
            }
        }
    }

    /// Determines if the task is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

#[cfg(test)]
mod tests {
    use crate::manager::SetOptions;
    use crate::settings::CacheSettings;
    use crate::shared::SharedCache;
    use crate::strategy::{StrategyKind, StrategyOptions};
    use mock_instant::thread_local::MockClock;
    use std::time::Duration;

    fn cache() -> SharedCache<i32> {
        SharedCache::new(CacheSettings {
            strategy: StrategyKind::Ttl,
            strategy_options: StrategyOptions {
                ttl: Some(Duration::from_secs(10)),
                ..StrategyOptions::default()
            },
            ..CacheSettings::default()
        })
    }

    #[test]
    fn stale_entries_are_swept() {
        crate::testing::test_async(async {
            let cache = cache();
            cache.set("stale", 1, SetOptions::new());
            cache.set("also_stale", 2, SetOptions::new());
            MockClock::advance(Duration::from_secs(11));
            cache.set("fresh", 3, SetOptions::new());

            let maintenance = super::spawn(cache.clone(), Duration::from_millis(5));
            for _ in 0..100 {
                if cache.len() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            assert_eq!(cache.keys(), vec!["fresh"]);
            assert_eq!(cache.stats().evictions, 2);
            assert_eq!(maintenance.is_running(), true);

            maintenance.stop().await;
        });
    }

    #[test]
    fn a_dropped_handle_stops_the_task() {
        crate::testing::test_async(async {
            let cache = cache();
            drop(super::spawn(cache.clone(), Duration::from_millis(5)));

            cache.set("stale", 1, SetOptions::new());
            MockClock::advance(Duration::from_secs(11));
            tokio::time::sleep(Duration::from_millis(50)).await;

            assert_eq!(cache.len(), 1);
        });
    }
}
