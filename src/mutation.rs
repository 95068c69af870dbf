//! Mutation handles returned by `use_create`, `use_update` and `use_delete`.
//!
//! Each handle sends one request per `mutate()` call and, on success, applies
//! the resource's invalidation contract to the cache. The handle also tracks
//! the status of its own calls (`is_loading`, `is_error`, `error`) for views
//! that render a spinner or an error next to a form.

use crate::error::{Error, Result};
use crate::record::ResourceRecord;
use crate::resource::Resource;
use crate::transport::Method;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MutationStatus {
    pending: usize,
    error: Option<Error>,
}

/// Status shared by clones of one mutation handle.
#[derive(Clone, Default)]
struct Tracker(Arc<Mutex<MutationStatus>>);

impl Tracker {
    fn lock(&self) -> MutexGuard<'_, MutationStatus> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Pending<'_> {
        let mut status = self.lock();
        status.pending += 1;
        status.error = None;
        Pending { tracker: self }
    }

    fn is_loading(&self) -> bool {
        self.lock().pending > 0
    }

    fn error(&self) -> Option<Error> {
        self.lock().error.clone()
    }

    fn reset(&self) {
        self.lock().error = None;
    }
}

/// One running `mutate()` call. Dropping it ends the call, even when the
/// caller abandons the future.
struct Pending<'a> {
    tracker: &'a Tracker,
}

impl Pending<'_> {
    fn finish<T>(self, result: &Result<T>) {
        if let Err(e) = result {
            self.tracker.lock().error = Some(e.clone());
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut status = self.tracker.lock();
        status.pending = status.pending.saturating_sub(1);
    }
}

macro_rules! mutation_status {
    () => {
        /// A `mutate()` call is running.
        pub fn is_loading(&self) -> bool {
            self.tracker.is_loading()
        }

        /// The last `mutate()` call failed.
        pub fn is_error(&self) -> bool {
            self.tracker.error().is_some()
        }

        /// Error of the last failed call, cleared when a new call starts.
        pub fn error(&self) -> Option<Error> {
            self.tracker.error()
        }

        /// Forget the last error.
        pub fn reset(&self) {
            self.tracker.reset()
        }
    };
}

/// `POST {base_path}`.
///
/// On success every list query of the resource is marked stale and the new
/// record is written to its detail entry, so opening it needs no request.
pub struct CreateMutation<T> {
    resource: Resource<T>,
    tracker: Tracker,
}

impl<T: ResourceRecord> CreateMutation<T> {
    pub(crate) fn new(resource: Resource<T>) -> Self {
        CreateMutation {
            resource,
            tracker: Tracker::default(),
        }
    }

    /// Create a record from `input` and return it as the server stored it.
    ///
    /// # Errors
    ///
    /// Returns the transport error, or `DecodeError` when the response is
    /// not a `T`. The cache is left untouched on failure.
    pub async fn mutate<B>(&self, input: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let pending = self.tracker.begin();
        let result = self.run(input).await;
        pending.finish(&result);
        result
    }

    async fn run<B>(&self, input: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let request = self
            .resource
            .request(Method::Post)
            .with_body(serde_json::to_value(input)?);
        let body = self.resource.transport().send(request).await?;
        let record: T = serde_json::from_value(body)?;

        let id = record.id();
        let stale = self.resource.invalidate_lists();
        self.resource
            .cache()
            .write(&self.resource.detail_key(&id), serde_json::to_value(&record)?);

        info!(
            "✓ Created {} {} ({} list queries stale)",
            self.resource.name(),
            id,
            stale
        );
        Ok(record)
    }

    mutation_status!();
}

/// `PATCH {base_path}/{id}` for one record.
///
/// On success every list query and the record's detail entry are marked
/// stale.
pub struct UpdateMutation<T: ResourceRecord> {
    resource: Resource<T>,
    id: T::Id,
    tracker: Tracker,
}

impl<T: ResourceRecord> UpdateMutation<T> {
    pub(crate) fn new(resource: Resource<T>, id: T::Id) -> Self {
        UpdateMutation {
            resource,
            id,
            tracker: Tracker::default(),
        }
    }

    pub fn id(&self) -> &T::Id {
        &self.id
    }

    /// Apply `patch` to the record and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns the transport error, or `DecodeError` when the response is
    /// not a `T`.
    pub async fn mutate<B>(&self, patch: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let pending = self.tracker.begin();
        let result = self.run(patch).await;
        pending.finish(&result);
        result
    }

    async fn run<B>(&self, patch: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
    {
        let request = self
            .resource
            .request(Method::Patch)
            .with_id(self.id.to_string())
            .with_body(serde_json::to_value(patch)?);
        let body = self.resource.transport().send(request).await?;
        let record: T = serde_json::from_value(body)?;

        let name = self.resource.name();
        let detail = self.resource.detail_key(&self.id);
        let stale = self
            .resource
            .cache()
            .invalidate(|key| key.is_list_of(name) || *key == detail);

        info!("✓ Updated {} {} ({} queries stale)", name, self.id, stale);
        Ok(record)
    }

    mutation_status!();
}

/// `DELETE {base_path}/{id}`.
///
/// On success every list query is marked stale and the record's detail
/// entry is evicted: the record is gone, so its last value is not kept.
pub struct DeleteMutation<T> {
    resource: Resource<T>,
    tracker: Tracker,
}

impl<T: ResourceRecord> DeleteMutation<T> {
    pub(crate) fn new(resource: Resource<T>) -> Self {
        DeleteMutation {
            resource,
            tracker: Tracker::default(),
        }
    }

    /// Delete the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns the transport error. The cache is left untouched on failure.
    pub async fn mutate(&self, id: &T::Id) -> Result<()> {
        let pending = self.tracker.begin();
        let result = self.run(id).await;
        pending.finish(&result);
        result
    }

    async fn run(&self, id: &T::Id) -> Result<()> {
        let request = self
            .resource
            .request(Method::Delete)
            .with_id(id.to_string());
        self.resource.transport().send(request).await?;

        let stale = self.resource.invalidate_lists();
        self.resource.cache().remove(&self.resource.detail_key(id));

        info!(
            "✓ Deleted {} {} ({} list queries stale)",
            self.resource.name(),
            id,
            stale
        );
        Ok(())
    }

    mutation_status!();
}

impl<T> fmt::Debug for CreateMutation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateMutation")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<T: ResourceRecord> fmt::Debug for UpdateMutation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateMutation")
            .field("resource", &self.resource)
            .field("id", &self.id.to_string())
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for DeleteMutation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteMutation")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use crate::key::Params;
    use crate::resource::ResourceDescriptor;
    use crate::transport::InMemoryTransport;
    use serde_json::{json, Value};
    use std::time::Duration;

    const LOGS: &str = "/api/daily-logs";

    fn setup() -> (Resource<Value>, InMemoryTransport) {
        let transport = InMemoryTransport::new();
        transport.insert(LOGS, json!({"id": "l-1", "weather": "sunny", "crew": 4}));
        let resource = Resource::new(
            ResourceDescriptor::new("daily_logs", LOGS),
            QueryCache::new(),
            Arc::new(transport.clone()),
        );
        (resource, transport)
    }

    #[tokio::test]
    async fn test_create_seeds_detail() {
        let (logs, transport) = setup();

        let created = logs
            .use_create()
            .mutate(&json!({"weather": "rain", "crew": 2}))
            .await
            .expect("Failed to create");
        let id = created.id();
        assert!(!id.is_empty());

        let detail = logs.use_detail(Some(&id)).fetch().await;
        assert_eq!(detail.data, Some(created));
        // POST only; the detail came from the cache.
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_create_invalidates_lists() {
        let (logs, transport) = setup();
        let all = logs.use_list(Params::new());
        let sunny = logs.use_list(Params::new().with("weather", "sunny"));
        all.fetch().await;
        sunny.fetch().await;

        logs.use_create()
            .mutate(&json!({"weather": "sunny"}))
            .await
            .expect("Failed to create");

        assert!(all.state().is_stale);
        assert!(sunny.state().is_stale);

        transport.reset_requests();
        let result = sunny.fetch().await;
        assert_eq!(result.data.map(|d| d.len()), Some(2));
        assert_eq!(transport.count(Method::Get), 1);
    }

    #[tokio::test]
    async fn test_update_invalidates_detail_and_lists() {
        let (logs, _) = setup();
        let id = "l-1".to_string();
        let detail = logs.use_detail(Some(&id));
        let list = logs.use_list(Params::new());
        detail.fetch().await;
        list.fetch().await;

        let update = logs.use_update(id.clone());
        let updated = update
            .mutate(&json!({"crew": 6}))
            .await
            .expect("Failed to update");
        assert_eq!(updated["crew"], 6);
        assert_eq!(update.id(), "l-1");

        assert!(detail.state().is_stale);
        assert!(list.state().is_stale);
        assert_eq!(detail.fetch().await.data.map(|d| d["crew"].clone()), Some(json!(6)));
    }

    #[tokio::test]
    async fn test_delete_evicts_detail() {
        let (logs, transport) = setup();
        let id = "l-1".to_string();
        let list = logs.use_list(Params::new());
        logs.use_detail(Some(&id)).fetch().await;
        list.fetch().await;

        logs.use_delete().mutate(&id).await.expect("Failed to delete");

        assert!(logs.cache().peek(&logs.detail_key(&id)).is_none());
        assert!(list.state().is_stale);

        transport.reset_requests();
        let gone = logs.use_detail(Some(&id)).fetch().await;
        assert!(gone.error.as_ref().is_some_and(Error::is_not_found));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_mutation_tracks_error() {
        let (logs, _) = setup();
        let delete = logs.use_delete();

        let err = delete
            .mutate(&"missing".to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(delete.is_error());
        assert!(!delete.is_loading());
        assert_eq!(delete.error().and_then(|e| e.status()), Some(404));

        delete.reset();
        assert!(!delete.is_error());
        assert!(delete.error().is_none());
    }

    #[tokio::test]
    async fn test_failed_create_leaves_cache_alone() {
        let (logs, transport) = setup();
        let list = logs.use_list(Params::new());
        list.fetch().await;

        transport.fail_next(Error::HttpError {
            status: 422,
            body: json!({"errors": {"weather": "required"}}),
        });
        let create = logs.use_create();
        let err = create.mutate(&json!({})).await.unwrap_err();

        assert_eq!(err.status(), Some(422));
        assert!(create.is_error());
        assert!(!list.state().is_stale);
    }

    #[tokio::test]
    async fn test_is_loading_while_running() {
        let transport = InMemoryTransport::new().with_latency(Duration::from_millis(50));
        let logs: Resource<Value> = Resource::new(
            ResourceDescriptor::new("daily_logs", LOGS),
            QueryCache::new(),
            Arc::new(transport),
        );
        let create = logs.use_create();

        let body = json!({"weather": "fog"});
        let running = create.mutate(&body);
        tokio::pin!(running);
        assert!(futures::poll!(running.as_mut()).is_pending());
        assert!(create.is_loading());

        running.await.expect("Failed to create");
        assert!(!create.is_loading());
        assert!(!create.is_error());
    }
}
