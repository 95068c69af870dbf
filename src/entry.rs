//! Cache entry snapshots.

use crate::error::Error;
use crate::key::QueryKey;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// Known to the cache, never fetched
    #[default]
    Idle,
    /// A fetch is in flight
    Loading,
    /// Last fetch succeeded, `data` is set
    Success,
    /// Last fetch failed, `error` is set (`data` may hold the previous value)
    Error,
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStatus::Idle => write!(f, "idle"),
            QueryStatus::Loading => write!(f, "loading"),
            QueryStatus::Success => write!(f, "success"),
            QueryStatus::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time view of one cache entry.
///
/// The cache owns the live entry. Snapshots are handed to callers and
/// listeners and never change after they are taken.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub state: QueryStatus,
    /// Last successfully fetched (or written) value.
    pub data: Option<Arc<Value>>,
    pub error: Option<Error>,
    pub fetched_at: Option<Instant>,
    /// Invalidated since the last fetch, or older than the freshness policy allows.
    pub is_stale: bool,
    pub subscriber_count: usize,
    /// A request for this key is currently running.
    pub in_flight: bool,
}

impl CacheEntry {
    pub fn is_loading(&self) -> bool {
        self.state == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.state == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.state == QueryStatus::Error
    }

    /// Time since the data was fetched.
    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|t| t.elapsed())
    }
}
