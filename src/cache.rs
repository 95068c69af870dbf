//! Query cache - single source of truth for fetched resource data.
//!
//! Uses DashMap for concurrent access with per-key sharding. Every critical
//! section is synchronous and short; no map lock is ever held across an
//! `.await`, and listeners are always invoked after the lock is released.
//!
//! # Request de-duplication
//!
//! The first caller that needs data for a key starts the loader on the tokio
//! runtime and registers a shared handle to its result in the entry. Every
//! caller that arrives while the request runs awaits the same handle, so all
//! of them observe exactly one network call. The spawned request completes
//! even if every caller goes away, and its result still lands in the cache.
//!
//! # Staleness
//!
//! `invalidate()` never drops data. It marks entries stale so the next
//! `fetch_if_needed()` refetches, while readers keep seeing the last good
//! value. A fetch that was already running when the invalidation happened
//! still stores its result, but the entry stays stale.
//!
//! # Ordering
//!
//! A read that arrives after `invalidate()` never joins the request that was
//! running before it; it starts a new one. Callers still waiting on the older
//! request are handed over to the newest, so every waiter observes the result
//! of the latest requested fetch.

use crate::entry::{CacheEntry, QueryStatus};
use crate::error::{Error, Result};
use crate::key::QueryKey;
use crate::observability::{CacheMetrics, FreshnessPolicy, NoOpMetrics};
use crate::strategy::FetchStrategy;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>>>>;
type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// Cache configuration.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// How long successful entries stay fresh.
    pub freshness: FreshnessPolicy,

    /// Evict an entry when its last subscriber leaves and it is not fresh.
    pub evict_on_release: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            freshness: FreshnessPolicy::default(),
            evict_on_release: true,
        }
    }
}

struct InFlight {
    id: u64,
    future: SharedFetch,
    /// Set when `write()` replaced the data while this request was running.
    discard: bool,
}

#[derive(Default)]
struct Slot {
    state: QueryStatus,
    data: Option<Arc<Value>>,
    error: Option<Error>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    in_flight: Option<InFlight>,
    /// Id of the most recently started request.
    latest: u64,
    subscribers: Vec<(u64, Option<Listener>)>,
}

impl Slot {
    fn is_stale(&self, max_age: Option<Duration>) -> bool {
        let expired = match (max_age, self.fetched_at) {
            (Some(age), Some(at)) => at.elapsed() > age,
            _ => false,
        };
        self.invalidated || expired
    }

    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        self.state == QueryStatus::Success && !self.is_stale(max_age)
    }

    fn is_evictable(&self, max_age: Option<Duration>) -> bool {
        self.subscribers.is_empty() && self.in_flight.is_none() && !self.is_fresh(max_age)
    }

    fn snapshot(&self, key: &QueryKey, max_age: Option<Duration>) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            state: self.state,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_stale: self.is_stale(max_age),
            subscriber_count: self.subscribers.len(),
            in_flight: self.in_flight.is_some(),
        }
    }

    fn listeners(&self) -> Vec<Listener> {
        self.subscribers
            .iter()
            .filter_map(|(_, listener)| listener.clone())
            .collect()
    }

    /// Forget data and state but keep subscribers attached.
    fn reset(&mut self) {
        self.state = QueryStatus::Idle;
        self.data = None;
        self.error = None;
        self.fetched_at = None;
        self.invalidated = false;
        self.in_flight = None;
    }
}

type Notification = (CacheEntry, Vec<Listener>);

fn notify(notification: Notification) {
    let (snapshot, listeners) = notification;
    for listener in listeners {
        listener(&snapshot);
    }
}

enum Step {
    Cached(Option<Arc<Value>>),
    Hit(Option<Arc<Value>>),
    Join(u64, SharedFetch),
    Start {
        id: u64,
        tx: oneshot::Sender<Result<Arc<Value>>>,
        future: SharedFetch,
        notification: Notification,
    },
}

/// What a waiter finds once its own request has finished.
enum Newer {
    Running(u64, SharedFetch),
    Settled(Result<Arc<Value>>),
    Current,
}

struct Inner {
    entries: DashMap<QueryKey, Slot>,
    config: CacheConfig,
    metrics: Box<dyn CacheMetrics>,
    next_id: AtomicU64,
}

/// Identity-keyed store of fetched data with in-flight de-duplication.
///
/// `QueryCache` is an explicit object: construct one at the application root
/// and hand clones to whoever needs it. Clones share the same entries.
///
/// Fetching requires a tokio runtime, since loaders run as spawned tasks.
///
/// # Example
///
/// ```no_run
/// use query_kit::key::{Params, QueryKey};
/// use query_kit::QueryCache;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> query_kit::Result<()> {
///     let cache = QueryCache::new();
///     let key = QueryKey::list("bids", Params::new().with("status", "draft"));
///
///     let data = cache
///         .fetch_if_needed(&key, || async { Ok(json!([{"id": "1"}])) })
///         .await?;
///     assert_eq!(data[0]["id"], "1");
///
///     // Mark every bids list stale; the next read refetches.
///     cache.invalidate(|k| k.is_list_of("bids"));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        QueryCache::builder().build()
    }

    /// Create a cache with the given configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        QueryCache::builder().config(config).build()
    }

    pub fn builder() -> QueryCacheBuilder {
        QueryCacheBuilder::default()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn max_age(&self, key: &QueryKey) -> Option<Duration> {
        self.inner.config.freshness.max_age(key.resource())
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshot of the entry for `key`, creating an idle entry if absent.
    ///
    /// Never fetches.
    pub fn resolve(&self, key: &QueryKey) -> CacheEntry {
        let max_age = self.max_age(key);
        let slot = self.inner.entries.entry(key.clone()).or_default();
        slot.snapshot(key, max_age)
    }

    /// Snapshot of the entry for `key` without creating it.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        let max_age = self.max_age(key);
        self.inner
            .entries
            .get(key)
            .map(|slot| slot.snapshot(key, max_age))
    }

    /// Return fresh cached data, or fetch it with `loader`.
    ///
    /// - Fresh success: cached data, loader not called.
    /// - Request in flight: await that request instead of starting another,
    ///   unless the entry was invalidated after it started.
    /// - Otherwise: run `loader`, store the outcome, return it.
    ///
    /// # Errors
    ///
    /// Returns the loader's error. The error is also stored in the entry,
    /// which keeps any previously fetched data.
    pub async fn fetch_if_needed<F, Fut>(&self, key: &QueryKey, loader: F) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.fetch_with(key, FetchStrategy::IfNeeded, loader)
            .await?
            .ok_or_else(|| Error::Other(format!("entry {} has no data", key)))
    }

    /// Fetch even if the entry is fresh. Joins a request already in flight.
    ///
    /// # Errors
    ///
    /// Returns the loader's error.
    pub async fn refetch<F, Fut>(&self, key: &QueryKey, loader: F) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.fetch_with(key, FetchStrategy::Force, loader)
            .await?
            .ok_or_else(|| Error::Other(format!("entry {} has no data", key)))
    }

    /// Read through the cache with an explicit strategy.
    ///
    /// Returns `Ok(None)` only for `FetchStrategy::CacheOnly` on an entry
    /// without data.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or the error of the joined request.
    pub async fn fetch_with<F, Fut>(
        &self,
        key: &QueryKey,
        strategy: FetchStrategy,
        loader: F,
    ) -> Result<Option<Arc<Value>>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let max_age = self.max_age(key);

        let step = {
            let mut slot = self.inner.entries.entry(key.clone()).or_default();

            if strategy == FetchStrategy::CacheOnly {
                Step::Cached(slot.data.clone())
            } else if strategy == FetchStrategy::IfNeeded && slot.is_fresh(max_age) {
                Step::Hit(slot.data.clone())
            } else if let Some(in_flight) = slot.in_flight.as_ref().filter(|_| !slot.invalidated) {
                Step::Join(in_flight.id, in_flight.future.clone())
            } else {
                if slot.in_flight.is_some() {
                    debug!("Entry {} invalidated while loading, superseding request", key);
                }
                let id = self.next_id();
                let (tx, rx) = oneshot::channel();
                let future = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(Error::Other(
                            "fetch task dropped before completing".to_string(),
                        ))
                    })
                }
                .boxed()
                .shared();

                slot.state = QueryStatus::Loading;
                slot.error = None;
                slot.invalidated = false;
                slot.latest = id;
                slot.in_flight = Some(InFlight {
                    id,
                    future: future.clone(),
                    discard: false,
                });

                Step::Start {
                    id,
                    tx,
                    future,
                    notification: (slot.snapshot(key, max_age), slot.listeners()),
                }
            }
        };

        match step {
            Step::Cached(data) => Ok(data),
            Step::Hit(data) => {
                self.inner.metrics.record_hit(key.as_str());
                debug!("✓ Query HIT {}", key);
                Ok(data)
            }
            Step::Join(id, future) => {
                self.inner.metrics.record_dedup(key.as_str());
                debug!("Joining in-flight request for {}", key);
                self.await_latest(key, id, future).await.map(Some)
            }
            Step::Start {
                id,
                tx,
                future,
                notification,
            } => {
                notify(notification);
                debug!("» Fetching {} (strategy: {})", key, strategy);

                // A loader can panic before it hands back a future.
                let request = match std::panic::catch_unwind(AssertUnwindSafe(loader)) {
                    Ok(request) => request.boxed(),
                    Err(_) => {
                        let panicked = Err(Error::Other("loader panicked".to_string()));
                        futures::future::ready(panicked).boxed()
                    }
                };
                let cache = self.clone();
                let task_key = key.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = AssertUnwindSafe(request)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(Error::Other("loader panicked".to_string())))
                        .map(Arc::new);
                    cache.settle(&task_key, id, &result, started);
                    // Waiters may all be gone; the cache is already updated.
                    let _ = tx.send(result);
                });

                self.await_latest(key, id, future).await.map(Some)
            }
        }
    }

    /// Await request `id`, then follow any newer request started for `key`
    /// while it ran.
    async fn await_latest(
        &self,
        key: &QueryKey,
        mut id: u64,
        mut future: SharedFetch,
    ) -> Result<Arc<Value>> {
        loop {
            let result = future.await;

            let newer = match self.inner.entries.get(key) {
                Some(slot) if slot.latest != id => match &slot.in_flight {
                    Some(in_flight) => Newer::Running(in_flight.id, in_flight.future.clone()),
                    None => match (slot.state, &slot.data, &slot.error) {
                        (QueryStatus::Success, Some(data), _) => Newer::Settled(Ok(data.clone())),
                        (QueryStatus::Error, _, Some(e)) => Newer::Settled(Err(e.clone())),
                        _ => Newer::Current,
                    },
                },
                _ => Newer::Current,
            };

            match newer {
                Newer::Running(next_id, next) => {
                    debug!("Request for {} superseded, following the newer one", key);
                    id = next_id;
                    future = next;
                }
                Newer::Settled(settled) => return settled,
                Newer::Current => return result,
            }
        }
    }

    /// Store the outcome of request `id` if it is still the registered one.
    fn settle(&self, key: &QueryKey, id: u64, result: &Result<Arc<Value>>, started: Instant) {
        match result {
            Ok(_) => self.inner.metrics.record_fetch(key.as_str(), started.elapsed()),
            Err(e) => self.inner.metrics.record_error(key.as_str(), &e.to_string()),
        }

        let max_age = self.max_age(key);
        let notification = {
            let Some(mut slot) = self.inner.entries.get_mut(key) else {
                debug!("Entry {} evicted while loading, result not stored", key);
                return;
            };

            let discard = match &slot.in_flight {
                Some(in_flight) if in_flight.id == id => in_flight.discard,
                _ => {
                    debug!("Request for {} superseded, result not stored", key);
                    return;
                }
            };
            slot.in_flight = None;

            if discard {
                debug!("Entry {} was written while loading, result not stored", key);
                return;
            }

            match result {
                Ok(data) => {
                    slot.state = QueryStatus::Success;
                    slot.data = Some(data.clone());
                    slot.error = None;
                    slot.fetched_at = Some(Instant::now());
                }
                Err(e) => {
                    // Keep last good data next to the error.
                    slot.state = QueryStatus::Error;
                    slot.error = Some(e.clone());
                }
            }

            if slot.invalidated {
                debug!("Entry {} was invalidated while loading, stays stale", key);
            }

            (slot.snapshot(key, max_age), slot.listeners())
        };

        notify(notification);
    }

    /// Mark every entry whose key matches `predicate` as stale.
    ///
    /// Data is kept, so readers still see the last value until the refetch
    /// lands. Returns the number of matched entries.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey) -> bool,
    {
        let mut matched = 0;
        let mut notifications = Vec::new();

        for mut item in self.inner.entries.iter_mut() {
            if !predicate(item.key()) {
                continue;
            }
            let key = item.key().clone();
            let max_age = self.max_age(&key);
            let slot = item.value_mut();
            slot.invalidated = true;
            matched += 1;

            let listeners = slot.listeners();
            if !listeners.is_empty() {
                notifications.push((slot.snapshot(&key, max_age), listeners));
            }
        }

        self.inner.metrics.record_invalidate(matched);
        for notification in notifications {
            notify(notification);
        }
        matched
    }

    /// Seed `key` with `data` as a fresh success.
    ///
    /// A request already in flight for the key still completes, but its
    /// result is not stored over the written data.
    pub fn write(&self, key: &QueryKey, data: Value) {
        let max_age = self.max_age(key);
        let notification = {
            let mut slot = self.inner.entries.entry(key.clone()).or_default();
            slot.state = QueryStatus::Success;
            slot.data = Some(Arc::new(data));
            slot.error = None;
            slot.fetched_at = Some(Instant::now());
            slot.invalidated = false;
            if let Some(in_flight) = slot.in_flight.as_mut() {
                in_flight.discard = true;
            }
            (slot.snapshot(key, max_age), slot.listeners())
        };

        debug!("✓ Query WRITE {}", key);
        notify(notification);
    }

    /// Evict the entry for `key`.
    ///
    /// Data, error and any in-flight registration are dropped. When the entry
    /// still has subscribers it stays in the map as `Idle` so they keep
    /// receiving updates. Returns `true` if an entry existed.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let max_age = self.max_age(key);
        let removed = self
            .inner
            .entries
            .remove_if(key, |_, slot| slot.subscribers.is_empty());
        if removed.is_some() {
            debug!("✓ Query REMOVE {}", key);
            return true;
        }

        let notification = match self.inner.entries.get_mut(key) {
            Some(mut slot) => {
                slot.reset();
                (slot.snapshot(key, max_age), slot.listeners())
            }
            None => return false,
        };

        debug!("✓ Query REMOVE {} (kept for subscribers)", key);
        notify(notification);
        true
    }

    /// Register `listener` for state changes of `key`.
    ///
    /// The listener receives a snapshot on every transition: fetch start,
    /// success, error, invalidation, write and eviction. The subscription
    /// counts as a consumer of the entry until it is dropped.
    pub fn subscribe<L>(&self, key: &QueryKey, listener: L) -> Subscription
    where
        L: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.attach(key, Some(Arc::new(listener)))
    }

    /// Count a consumer of `key` without listening to it.
    pub fn retain(&self, key: &QueryKey) -> Subscription {
        self.attach(key, None)
    }

    fn attach(&self, key: &QueryKey, listener: Option<Listener>) -> Subscription {
        let id = self.next_id();
        self.inner
            .entries
            .entry(key.clone())
            .or_default()
            .subscribers
            .push((id, listener));

        Subscription {
            cache: self.clone(),
            key: key.clone(),
            id,
            active: true,
        }
    }

    fn release(&self, key: &QueryKey, id: u64) {
        let max_age = self.max_age(key);
        let evict = self.inner.config.evict_on_release;
        let evicted = self.inner.entries.remove_if_mut(key, |_, slot| {
            slot.subscribers.retain(|(sub_id, _)| *sub_id != id);
            evict && slot.is_evictable(max_age)
        });

        if evicted.is_some() {
            debug!("✓ Query EVICT {} (last subscriber left)", key);
        }
    }

    /// Evict every entry with no subscribers, no request in flight and no
    /// fresh data. Returns the number of evicted entries.
    pub fn collect_garbage(&self) -> usize {
        let mut evicted = 0;
        self.inner.entries.retain(|key, slot| {
            let keep = !slot.is_evictable(self.max_age(key));
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!("✓ Query GC evicted {} entries", evicted);
        }
        evicted
    }

    /// Keys currently held by the cache.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner
            .entries
            .iter()
            .map(|item| item.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every entry. Running requests complete without storing results.
    pub fn clear(&self) {
        self.inner.entries.clear();
        warn!("⚠ Query cache CLEAR executed - all entries dropped!");
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for item in self.inner.entries.iter() {
            let slot = item.value();
            stats.total_entries += 1;
            if slot.in_flight.is_some() {
                stats.loading_entries += 1;
            }
            if slot.is_stale(self.max_age(item.key())) {
                stats.stale_entries += 1;
            }
            if slot.state == QueryStatus::Error {
                stats.error_entries += 1;
            }
            stats.subscribers += slot.subscribers.len();
        }
        stats
    }

    /// Print cache statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Query cache stats: {} entries ({} loading, {} stale, {} failed), {} subscribers",
            stats.total_entries,
            stats.loading_entries,
            stats.stale_entries,
            stats.error_entries,
            stats.subscribers
        );
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`QueryCache`].
#[derive(Default)]
pub struct QueryCacheBuilder {
    config: CacheConfig,
    metrics: Option<Box<dyn CacheMetrics>>,
}

impl QueryCacheBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.config.freshness = policy;
        self
    }

    pub fn evict_on_release(mut self, evict: bool) -> Self {
        self.config.evict_on_release = evict;
        self
    }

    /// Set custom metrics handler.
    pub fn metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> QueryCache {
        QueryCache {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                config: self.config,
                metrics: self.metrics.unwrap_or_else(|| Box::new(NoOpMetrics)),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

/// Consumer registration on one cache entry.
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    cache: QueryCache,
    key: QueryKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Unregister now instead of at drop.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.cache.release(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key.as_str())
            .field("id", &self.id)
            .finish()
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub loading_entries: usize,
    pub stale_entries: usize,
    pub error_entries: usize,
    pub subscribers: usize,
}
