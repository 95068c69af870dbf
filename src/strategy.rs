//! Fetch strategies for cache reads.
//!
//! Every read through [`QueryCache::fetch_with`](crate::QueryCache::fetch_with)
//! uses one of three strategies:
//!
//! | Strategy | Fresh entry | Stale / empty entry | Loading entry |
//! |----------|-------------|---------------------|---------------|
//! | **CacheOnly** | Return data | Return data or `None` | Return data or `None` |
//! | **IfNeeded** | Return data | Fetch | Join in-flight |
//! | **Force** | Fetch | Fetch | Join in-flight |
//!
//! `IfNeeded` is the default and is what `fetch_if_needed` uses. `Force` is
//! the explicit refetch path a caller takes to retry after an error; the
//! cache never retries on its own. No strategy starts a second request for a
//! key that already has one in flight.

/// Strategy enum controlling when a read goes to the network.
///
/// # Examples
///
/// ```
/// use query_kit::strategy::FetchStrategy;
///
/// // Serve what is cached, never fetch
/// let _strategy = FetchStrategy::CacheOnly;
///
/// // Fetch only when missing or stale
/// let _strategy = FetchStrategy::IfNeeded;
///
/// // Refetch even if fresh
/// let _strategy = FetchStrategy::Force;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// **CacheOnly**: read the entry, never call the loader.
    CacheOnly,

    /// **IfNeeded**: return fresh data, otherwise fetch.
    ///
    /// Flow:
    /// 1. Loading → join the in-flight request
    /// 2. Success and fresh → return cached data
    /// 3. Otherwise → fetch, store, return
    #[default]
    IfNeeded,

    /// **Force**: fetch even when the entry is fresh.
    Force,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::CacheOnly => write!(f, "CacheOnly"),
            FetchStrategy::IfNeeded => write!(f, "IfNeeded"),
            FetchStrategy::Force => write!(f, "Force"),
        }
    }
}
