//! Observability hooks and freshness policies for the query cache.
//!
//! This module separates two concerns:
//!
//! - **Metrics (`CacheMetrics`)**: hits, fetches, de-duplicated joins,
//!   invalidations and failures
//! - **Freshness (`FreshnessPolicy`)**: how long a successful entry is
//!   served without a refetch
//!
//! # Metrics
//!
//! Implement the `CacheMetrics` trait to forward cache events to your
//! monitoring system:
//!
//! ```ignore
//! use query_kit::observability::CacheMetrics;
//! use query_kit::QueryCache;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_fetch(&self, key: &str, duration: Duration) {
//!         // histogram!("query_fetch_latency").record(duration);
//!     }
//!     // ... implement other methods
//! }
//!
//! let cache = QueryCache::builder()
//!     .metrics(Box::new(PrometheusMetrics))
//!     .build();
//! ```
//!
//! The default methods log through the `log` crate. `NoOpMetrics` drops
//! everything and is what a cache uses unless told otherwise.
//!
//! # Freshness Policies
//!
//! ```
//! use query_kit::observability::FreshnessPolicy;
//! use std::time::Duration;
//!
//! // Fresh until a mutation invalidates it (default)
//! let _policy = FreshnessPolicy::UntilInvalidated;
//!
//! // Also stale after 30 seconds
//! let _policy = FreshnessPolicy::Fixed(Duration::from_secs(30));
//!
//! // Per resource
//! let _policy = FreshnessPolicy::PerResource(|resource| match resource {
//!     "daily_logs" => Duration::from_secs(10),
//!     _ => Duration::from_secs(300),
//! });
//! ```
//!
//! | Policy | Stale when |
//! |--------|------------|
//! | `UntilInvalidated` | Only after `invalidate()` |
//! | `Fixed` | After `invalidate()` or once older than the duration |
//! | `PerResource` | Same as `Fixed`, duration chosen by resource name |

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a read answered from cache without a fetch.
    fn record_hit(&self, key: &str) {
        debug!("Query HIT: {}", key);
    }

    /// Record a completed fetch.
    fn record_fetch(&self, key: &str, duration: Duration) {
        debug!("Query FETCH: {} took {:?}", key, duration);
    }

    /// Record a caller joining an in-flight fetch.
    fn record_dedup(&self, key: &str) {
        debug!("Query DEDUP: {} joined in-flight request", key);
    }

    /// Record an invalidation pass.
    fn record_invalidate(&self, matched: usize) {
        debug!("Query INVALIDATE: {} entries marked stale", matched);
    }

    /// Record a failed fetch.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Query ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str) {}
    fn record_fetch(&self, _key: &str, _duration: Duration) {}
    fn record_dedup(&self, _key: &str) {}
    fn record_invalidate(&self, _matched: usize) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics implementation that logs every event at the default levels.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}

/// How long a successful entry stays fresh.
#[derive(Clone, Debug, Default)]
pub enum FreshnessPolicy {
    /// Fresh until explicitly invalidated
    #[default]
    UntilInvalidated,

    /// Fresh for a fixed duration after the fetch
    Fixed(Duration),

    /// Custom per-resource policy
    PerResource(fn(&str) -> Duration),
}

impl FreshnessPolicy {
    /// Maximum age for entries of `resource`. `None` means no age limit.
    pub fn max_age(&self, resource: &str) -> Option<Duration> {
        match self {
            FreshnessPolicy::UntilInvalidated => None,
            FreshnessPolicy::Fixed(d) => Some(*d),
            FreshnessPolicy::PerResource(f) => Some(f(resource)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key");
        metrics.record_fetch("key", Duration::from_millis(2));
        metrics.record_error("key", "boom");
    }

    #[test]
    fn test_freshness_default() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.max_age("any"), None);
    }

    #[test]
    fn test_freshness_fixed() {
        let policy = FreshnessPolicy::Fixed(Duration::from_secs(30));
        assert_eq!(policy.max_age("any"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_freshness_per_resource() {
        let policy = FreshnessPolicy::PerResource(|resource| match resource {
            "daily_logs" => Duration::from_secs(10),
            _ => Duration::from_secs(300),
        });

        assert_eq!(policy.max_age("daily_logs"), Some(Duration::from_secs(10)));
        assert_eq!(policy.max_age("bids"), Some(Duration::from_secs(300)));
    }
}
