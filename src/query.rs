//! Read handles returned by `use_list` and `use_detail`.
//!
//! A [`Query`] binds a [`QueryKey`] to the loader that fetches it and reads
//! through the shared [`QueryCache`]. Results come back as a
//! [`QueryResult`]: data decoded into the record type plus the loading,
//! error and staleness flags a view needs to render. Failures never escape
//! as `Err`; they land in `QueryResult::error`.

use crate::cache::{QueryCache, Subscription};
use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::key::QueryKey;
use crate::strategy::FetchStrategy;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Produces one request for a query key, returning the JSON to cache.
pub(crate) type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// What a view renders for one query.
#[derive(Clone, Debug)]
pub struct QueryResult<T> {
    /// Last known data. May be stale, or kept next to an error.
    pub data: Option<T>,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<Error>,
    pub is_stale: bool,
}

impl<T> QueryResult<T> {
    /// Result of a disabled query: nothing loaded, nothing pending.
    pub fn idle() -> Self {
        QueryResult {
            data: None,
            is_loading: false,
            is_error: false,
            error: None,
            is_stale: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && !self.is_error
    }
}

impl<T: DeserializeOwned> QueryResult<T> {
    /// Decode a cache entry snapshot.
    ///
    /// Data that no longer decodes into `T` is reported as a `DecodeError`.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        let mut result = QueryResult {
            data: None,
            is_loading: entry.in_flight,
            is_error: entry.is_error(),
            error: entry.error.clone(),
            is_stale: entry.is_stale,
        };

        if let Some(value) = &entry.data {
            match decode::<T>(value) {
                Ok(data) => result.data = Some(data),
                Err(e) => {
                    result.is_error = true;
                    result.error = Some(e);
                }
            }
        }
        result
    }
}

impl<T> Default for QueryResult<T> {
    fn default() -> Self {
        Self::idle()
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| Error::DecodeError(e.to_string()))
}

/// Cache-backed read of one list or detail query.
///
/// Cheap to clone. A query without a key is disabled: every method returns
/// an idle result and no request is ever issued.
pub struct Query<T> {
    key: Option<QueryKey>,
    cache: QueryCache,
    loader: Option<Loader>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Query {
            key: self.key.clone(),
            cache: self.cache.clone(),
            loader: self.loader.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> Query<T> {
    pub(crate) fn new(key: QueryKey, cache: QueryCache, loader: Loader) -> Self {
        Query {
            key: Some(key),
            cache,
            loader: Some(loader),
            _record: PhantomData,
        }
    }

    pub(crate) fn disabled(cache: QueryCache) -> Self {
        Query {
            key: None,
            cache,
            loader: None,
            _record: PhantomData,
        }
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.key.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Return cached data if fresh, fetch otherwise.
    pub async fn fetch(&self) -> QueryResult<T> {
        self.fetch_with(FetchStrategy::IfNeeded).await
    }

    /// Fetch regardless of freshness. This is the retry path after an error.
    pub async fn refetch(&self) -> QueryResult<T> {
        self.fetch_with(FetchStrategy::Force).await
    }

    pub async fn fetch_with(&self, strategy: FetchStrategy) -> QueryResult<T> {
        let (Some(key), Some(loader)) = (&self.key, &self.loader) else {
            return QueryResult::idle();
        };

        let loader = loader.clone();
        let outcome = self
            .cache
            .fetch_with(key, strategy, move || loader())
            .await;
        let entry = self.cache.peek(key);

        match outcome {
            Ok(Some(value)) => {
                let mut result = QueryResult::idle();
                match decode::<T>(&value) {
                    Ok(data) => result.data = Some(data),
                    Err(e) => {
                        result.is_error = true;
                        result.error = Some(e);
                    }
                }
                if let Some(entry) = entry {
                    result.is_loading = entry.in_flight;
                    result.is_stale = entry.is_stale;
                }
                result
            }
            Ok(None) => entry
                .map(|entry| QueryResult::from_entry(&entry))
                .unwrap_or_default(),
            Err(e) => {
                let mut result = entry
                    .map(|entry| QueryResult::from_entry(&entry))
                    .unwrap_or_default();
                result.is_error = true;
                result.error = Some(e);
                result
            }
        }
    }

    /// Current state without any I/O.
    pub fn state(&self) -> QueryResult<T> {
        match &self.key {
            Some(key) => self
                .cache
                .peek(key)
                .map(|entry| QueryResult::from_entry(&entry))
                .unwrap_or_default(),
            None => QueryResult::idle(),
        }
    }

    /// Call `listener` with the decoded state on every transition of this
    /// query's entry. `None` for a disabled query.
    pub fn subscribe<L>(&self, listener: L) -> Option<Subscription>
    where
        L: Fn(&QueryResult<T>) + Send + Sync + 'static,
    {
        let key = self.key.as_ref()?;
        Some(self.cache.subscribe(key, move |entry| {
            listener(&QueryResult::from_entry(entry))
        }))
    }

    /// Hold the entry as a consumer without listening to it.
    pub fn retain(&self) -> Option<Subscription> {
        self.key.as_ref().map(|key| self.cache.retain(key))
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key.as_ref().map(QueryKey::as_str))
            .finish_non_exhaustive()
    }
}
