//! Provides memoization of async computations on top of a [SharedCache].
//!
//! A [Memoizer] serves repeated calls for the same key from the cache and only runs the
//! computation on a miss. Concurrent calls for the same key are coalesced: only the first caller
//! runs the computation while all others wait for it and are then served from the cache. If the
//! first caller fails (or its future is dropped), the next waiter performs the computation.
//!
//! Keys are always provided by the caller. There is no implicit derivation of a key from the
//! arguments of a function, see [Memoizer::wrap].
//!
//! # Examples
//! ```
//! # use cachet::memo::Memoizer;
//! # use cachet::shared::SharedCache;
//! # use std::time::Duration;
//! # #[tokio::main]
//! # async fn main() {
//! let memoizer = Memoizer::new(SharedCache::default())
//!     .with_ttl(Duration::from_secs(60))
//!     .with_tag("users");
//!
//! let name = memoizer
//!     .get_or_compute("user:42", || async { "Alice".to_owned() })
//!     .await;
//! assert_eq!(name, "Alice");
//!
//! // The second call is served from the cache...
//! let name = memoizer
//!     .get_or_compute("user:42", || async { unreachable!() })
//!     .await;
//! assert_eq!(name, "Alice");
//! # }
//! ```
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fnv::FnvHashMap;

use crate::manager::SetOptions;
use crate::shared::SharedCache;

type Slots = Arc<Mutex<FnvHashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Memoizes async computations in a shared cache.
///
/// All values are stored using the time to live and tags of the memoizer. Cloning a memoizer is
/// cheap and all clones coalesce their computations.
pub struct Memoizer<V> {
    cache: SharedCache<V>,
    ttl: Option<Duration>,
    tags: Vec<String>,
    slots: Slots,
}

impl<V> Clone for Memoizer<V> {
    fn clone(&self) -> Self {
        Memoizer {
            cache: self.cache.clone(),
            ttl: self.ttl,
            tags: self.tags.clone(),
            slots: self.slots.clone(),
        }
    }
}

/// Represents a computation which is currently running (or waiting to run) for a key.
///
/// Dropping this releases the slot of the key once no other caller waits for it.
struct InFlight {
    slots: Slots,
    key: String,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        // Only the map and this handle itself remain...
        if Arc::strong_count(&self.slot) <= 2 {
            let _ = slots.remove(&self.key);
        }
    }
}

impl<V: Clone> Memoizer<V> {
    /// Creates a new memoizer which stores its values in the given cache.
    pub fn new(cache: SharedCache<V>) -> Self {
        Memoizer {
            cache,
            ttl: None,
            tags: Vec::new(),
            slots: Arc::new(Mutex::new(FnvHashMap::default())),
        }
    }

    /// Specifies the time to live of all values stored by this memoizer.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Adds a tag which is attached to all values stored by this memoizer.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Returns the underlying cache.
    pub fn cache(&self) -> &SharedCache<V> {
        &self.cache
    }

    /// Returns the cached value for the given key or computes and stores it.
    pub async fn get_or_compute<F, Fut>(&self, key: impl Into<String>, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let key = key.into();
        if let Some(value) = self.lookup_quietly(&key) {
            return value;
        }

        let in_flight = self.enter(&key);
        let _guard = in_flight.slot.lock().await;

        // Exactly one hit or miss is recorded per call.
        if let Some(value) = self.cache.get(&key) {
            return value;
        }

        let value = compute().await;
        self.cache.set(key, value.clone(), self.options());
        value
    }

    /// Returns the cached value for the given key or tries to compute and store it.
    ///
    /// An error of the computation is handed back to the caller and nothing is cached.
    pub async fn try_get_or_compute<F, Fut, E>(
        &self,
        key: impl Into<String>,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = key.into();
        if let Some(value) = self.lookup_quietly(&key) {
            return Ok(value);
        }

        let in_flight = self.enter(&key);
        let _guard = in_flight.slot.lock().await;

        // Exactly one hit or miss is recorded per call.
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.cache.set(key, value.clone(), self.options());
        Ok(value)
    }

    /// Memoizes a whole async function.
    ///
    /// The **key_fn** derives the cache key from the arguments, **func** computes the value.
    ///
    /// # Examples
    /// ```
    /// # use cachet::memo::Memoizer;
    /// # use cachet::shared::SharedCache;
    /// # #[tokio::main]
    /// # async fn main() {
    /// let square = Memoizer::new(SharedCache::default()).wrap(
    ///     |n: &u64| format!("square:{}", n),
    ///     |n: u64| async move { n * n },
    /// );
    ///
    /// assert_eq!(square.call(12).await, 144);
    /// assert_eq!(square.memoizer().cache().has("square:12"), true);
    /// # }
    /// ```
    pub fn wrap<K, F>(&self, key_fn: K, func: F) -> Memoized<V, K, F> {
        Memoized {
            memoizer: self.clone(),
            key_fn,
            func,
        }
    }

    fn options(&self) -> SetOptions {
        SetOptions {
            ttl: self.ttl,
            tags: self.tags.clone(),
            size: None,
        }
    }

    /// Reads the value if it is present.
    ///
    /// An absent value isn't counted as miss, as the caller still has to check again once it
    /// owns the slot of the key.
    fn lookup_quietly(&self, key: &str) -> Option<V> {
        self.cache.with(|cache| {
            if cache.has(key) {
                cache.get(key).cloned()
            } else {
                None
            }
        })
    }

    fn enter(&self, key: &str) -> InFlight {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.to_owned()).or_default().clone();

        InFlight {
            slots: self.slots.clone(),
            key: key.to_owned(),
            slot,
        }
    }
}

/// Represents an async function memoized via [Memoizer::wrap].
pub struct Memoized<V, K, F> {
    memoizer: Memoizer<V>,
    key_fn: K,
    func: F,
}

impl<V: Clone, K, F> Memoized<V, K, F> {
    /// Invokes the function or serves its result from the cache.
    pub async fn call<A, Fut>(&self, args: A) -> V
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future<Output = V>,
    {
        let key = (self.key_fn)(&args);
        self.memoizer
            .get_or_compute(key, || (self.func)(args))
            .await
    }

    /// Returns the underlying memoizer.
    pub fn memoizer(&self) -> &Memoizer<V> {
        &self.memoizer
    }
}

#[cfg(test)]
mod tests {
    use crate::memo::Memoizer;
    use crate::shared::SharedCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn values_are_computed_once() {
        crate::testing::test_async(async {
            let memoizer = Memoizer::new(SharedCache::default()).with_tag("numbers");
            let calls = AtomicUsize::new(0);

            for _ in 0..3 {
                let value = memoizer
                    .get_or_compute("answer", || async {
                        let _ = calls.fetch_add(1, Ordering::SeqCst);
                        42
                    })
                    .await;
                assert_eq!(value, 42);
            }

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(memoizer.cache().keys_by_tag("numbers"), vec!["answer"]);

            let stats = memoizer.cache().stats();
            assert_eq!(stats.hits, 2);
            assert_eq!(stats.misses, 1);
        });
    }

    #[test]
    fn errors_are_not_cached() {
        crate::testing::test_async(async {
            let memoizer = Memoizer::new(SharedCache::default());

            let result: Result<i32, &str> = memoizer
                .try_get_or_compute("flaky", || async { Err("failed") })
                .await;
            assert_eq!(result, Err("failed"));
            assert_eq!(memoizer.cache().has("flaky"), false);

            let result: Result<i32, &str> = memoizer
                .try_get_or_compute("flaky", || async { Ok(1) })
                .await;
            assert_eq!(result, Ok(1));

            let result: Result<i32, &str> = memoizer
                .try_get_or_compute("flaky", || async { Err("not called") })
                .await;
            assert_eq!(result, Ok(1));
        });
    }

    #[test]
    fn concurrent_calls_are_coalesced() {
        crate::testing::test_async(async {
            let memoizer = Memoizer::new(SharedCache::default());
            let calls = Arc::new(AtomicUsize::new(0));

            let futures = (0..10).map(|_| {
                let memoizer = memoizer.clone();
                let calls = calls.clone();
                async move {
                    memoizer
                        .get_or_compute("slow", || async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            calls.fetch_add(1, Ordering::SeqCst) + 1
                        })
                        .await
                }
            });
            let values = futures::future::join_all(futures).await;

            assert_eq!(values, vec![1; 10]);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(memoizer.slots.lock().unwrap().is_empty(), true);

            // Every call is counted exactly once...
            let stats = memoizer.cache().stats();
            assert_eq!(stats.hits + stats.misses, 10);
            assert_eq!(stats.misses, 1);
        });
    }

    #[test]
    fn a_failed_leader_hands_over_to_the_next_caller() {
        crate::testing::test_async(async {
            let memoizer: Memoizer<i32> = Memoizer::new(SharedCache::default());

            let leader = memoizer.try_get_or_compute("key", || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err("leader failed")
            });
            let follower = memoizer.try_get_or_compute("key", || async { Ok::<i32, &str>(7) });

            let (leader, follower) = futures::future::join(leader, follower).await;
            assert_eq!(leader, Err("leader failed"));
            assert_eq!(follower, Ok(7));
            assert_eq!(memoizer.cache().get("key"), Some(7));
        });
    }

    #[test]
    fn a_dropped_call_releases_its_slot() {
        crate::testing::test_async(async {
            let memoizer: Memoizer<i32> = Memoizer::new(SharedCache::default());

            let result = tokio::time::timeout(
                Duration::from_millis(10),
                memoizer.get_or_compute("stuck", || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    1
                }),
            )
            .await;

            assert_eq!(result.is_err(), true);
            assert_eq!(memoizer.slots.lock().unwrap().is_empty(), true);
            assert_eq!(
                memoizer.get_or_compute("stuck", || async { 2 }).await,
                2
            );
        });
    }

    #[test]
    fn functions_can_be_wrapped() {
        crate::testing::test_async(async {
            let calls = AtomicUsize::new(0);
            let memoizer = Memoizer::new(SharedCache::default()).with_ttl(Duration::from_secs(5));
            let greet = memoizer.wrap(
                |name: &String| format!("greeting:{}", name),
                |name: String| {
                    let _ = calls.fetch_add(1, Ordering::SeqCst);
                    async move { format!("Hello {}", name) }
                },
            );

            assert_eq!(greet.call("World".to_owned()).await, "Hello World");
            assert_eq!(greet.call("World".to_owned()).await, "Hello World");
            assert_eq!(greet.call("Moon".to_owned()).await, "Hello Moon");

            assert_eq!(calls.load(Ordering::SeqCst), 2);
            let ttl = memoizer
                .cache()
                .with(|cache| cache.peek("greeting:World").and_then(|entry| entry.ttl));
            assert_eq!(ttl, Some(Duration::from_secs(5)));
        });
    }
}
