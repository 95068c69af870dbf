//! Resource hook factory: a uniform CRUD surface over one REST resource.
//!
//! A [`Resource`] is created once per entity type from a name and a base
//! path. It produces read handles ([`Query`]) and mutation handles that all
//! go through the same [`QueryCache`], and it owns the invalidation contract
//! between them:
//!
//! | Operation | Request | Cache effect on success |
//! |-----------|---------|-------------------------|
//! | `use_list(params)` | `GET {base}?params` | entry `(name, list, params)` |
//! | `use_detail(id)` | `GET {base}/{id}` | entry `(name, detail, {id})` |
//! | `use_create()` | `POST {base}` | all lists stale, new detail seeded |
//! | `use_update(id)` | `PATCH {base}/{id}` | all lists and the detail stale |
//! | `use_delete()` | `DELETE {base}/{id}` | all lists stale, detail evicted |
//!
//! Invalidation always covers every list query of the resource, whatever its
//! params: a refetch too many is acceptable, a stale list is not.

use crate::cache::QueryCache;
use crate::error::Result;
use crate::key::{Params, QueryKey};
use crate::mutation::{CreateMutation, DeleteMutation, UpdateMutation};
use crate::query::{Loader, Query};
use crate::record::ResourceRecord;
use crate::transport::{ApiRequest, Method, Transport};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Static description of a REST resource. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    name: String,
    base_path: String,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, base_path: impl Into<String>) -> Self {
        ResourceDescriptor {
            name: name.into(),
            base_path: base_path.into(),
        }
    }

    /// Resource name, the first component of every cache key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

/// CRUD hooks for records of type `T`.
///
/// Cheap to clone; clones share the descriptor, cache and transport.
///
/// # Example
///
/// ```no_run
/// use query_kit::key::Params;
/// use query_kit::transport::InMemoryTransport;
/// use query_kit::{QueryCache, Resource, ResourceDescriptor};
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> query_kit::Result<()> {
///     let cache = QueryCache::new();
///     let transport = Arc::new(InMemoryTransport::new());
///     let bids: Resource<Value> =
///         Resource::new(ResourceDescriptor::new("bids", "/api/bids"), cache, transport);
///
///     let drafts = bids.use_list(Params::new().with("status", "draft"));
///     bids.use_create().mutate(&json!({"title": "Roof", "status": "draft"})).await?;
///
///     let result = drafts.fetch().await;
///     assert_eq!(result.data.map(|d| d.len()), Some(1));
///     Ok(())
/// }
/// ```
pub struct Resource<T> {
    descriptor: Arc<ResourceDescriptor>,
    cache: QueryCache,
    transport: Arc<dyn Transport>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Resource {
            descriptor: self.descriptor.clone(),
            cache: self.cache.clone(),
            transport: self.transport.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: ResourceRecord> Resource<T> {
    pub fn new(
        descriptor: ResourceDescriptor,
        cache: QueryCache,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Resource {
            descriptor: Arc::new(descriptor),
            cache,
            transport,
            _record: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Cache key of a list query.
    pub fn list_key(&self, params: Params) -> QueryKey {
        QueryKey::list(self.name(), params)
    }

    /// Cache key of a detail query.
    pub fn detail_key(&self, id: &T::Id) -> QueryKey {
        QueryKey::detail(self.name(), id)
    }

    /// Request against this resource's base path.
    pub(crate) fn request(&self, method: Method) -> ApiRequest {
        ApiRequest::new(method, self.descriptor.base_path())
    }

    /// List query for `params`.
    ///
    /// Params equal after normalization share one cache entry, whatever
    /// their insertion order.
    pub fn use_list(&self, params: Params) -> Query<Vec<T>> {
        let request = self
            .request(Method::Get)
            .with_query(params.to_query_pairs());
        let key = self.list_key(params);
        Query::new(key, self.cache.clone(), self.loader::<Vec<T>>(request))
    }

    /// Detail query for `id`. Disabled when `id` is `None`.
    pub fn use_detail(&self, id: Option<&T::Id>) -> Query<T> {
        let Some(id) = id else {
            return Query::disabled(self.cache.clone());
        };
        let request = self.request(Method::Get).with_id(id.to_string());
        Query::new(
            self.detail_key(id),
            self.cache.clone(),
            self.loader::<T>(request),
        )
    }

    pub fn use_create(&self) -> CreateMutation<T> {
        CreateMutation::new(self.clone())
    }

    pub fn use_update(&self, id: T::Id) -> UpdateMutation<T> {
        UpdateMutation::new(self.clone(), id)
    }

    pub fn use_delete(&self) -> DeleteMutation<T> {
        DeleteMutation::new(self.clone())
    }

    /// Mark every list query of this resource stale.
    pub fn invalidate_lists(&self) -> usize {
        let name = self.name();
        self.cache.invalidate(|key| key.is_list_of(name))
    }

    /// Loader that sends `request` and checks the body decodes as `R`
    /// before it is cached, so shape mismatches surface as fetch errors.
    fn loader<R>(&self, request: ApiRequest) -> Loader
    where
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        let transport = self.transport.clone();
        Arc::new(move || {
            let transport = transport.clone();
            let request = request.clone();
            async move {
                let body = transport.send(request).await?;
                normalize_body::<R>(body)
            }
            .boxed()
        })
    }
}

/// Decode `body` as `R` and re-encode it.
fn normalize_body<R>(body: Value) -> Result<Value>
where
    R: Serialize + DeserializeOwned,
{
    let record: R = serde_json::from_value(body)?;
    Ok(serde_json::to_value(record)?)
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::InMemoryTransport;
    use serde::Deserialize;
    use serde_json::json;

    const EQUIPMENT: &str = "/api/equipment";

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Equipment {
        id: String,
        name: String,
        status: String,
    }

    impl ResourceRecord for Equipment {
        type Id = String;

        fn id(&self) -> Self::Id {
            self.id.clone()
        }
    }

    fn setup() -> (Resource<Equipment>, InMemoryTransport) {
        let transport = InMemoryTransport::new();
        transport.insert(
            EQUIPMENT,
            json!({"id": "e-1", "name": "Crane", "status": "active"}),
        );
        transport.insert(
            EQUIPMENT,
            json!({"id": "e-2", "name": "Loader", "status": "repair"}),
        );
        let resource = Resource::new(
            ResourceDescriptor::new("equipment", EQUIPMENT),
            QueryCache::new(),
            Arc::new(transport.clone()),
        );
        (resource, transport)
    }

    #[tokio::test]
    async fn test_use_list_fetches_with_params() {
        let (equipment, transport) = setup();

        let result = equipment
            .use_list(Params::new().with("status", "repair"))
            .fetch()
            .await;

        let records = result.data.expect("List should load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Loader");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].to_string(), "GET /api/equipment?status=repair");
    }

    #[tokio::test]
    async fn test_equal_params_share_entry() {
        let (equipment, transport) = setup();

        let a = equipment.use_list(Params::new().with("status", "active").with("page", 1));
        let b = equipment.use_list(Params::new().with("page", 1).with("status", "active"));
        assert_eq!(a.key(), b.key());

        a.fetch().await;
        b.fetch().await;
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_use_detail() {
        let (equipment, transport) = setup();

        let crane = equipment
            .use_detail(Some(&"e-1".to_string()))
            .fetch()
            .await;
        assert_eq!(crane.data.map(|e| e.name), Some("Crane".to_string()));

        let disabled = equipment.use_detail(None);
        assert!(!disabled.is_enabled());
        assert!(disabled.fetch().await.data.is_none());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_detail_is_http_error() {
        let (equipment, _) = setup();

        let result = equipment
            .use_detail(Some(&"e-404".to_string()))
            .fetch()
            .await;
        assert!(result.is_error);
        assert!(result.error.as_ref().is_some_and(Error::is_not_found));
    }

    #[tokio::test]
    async fn test_shape_mismatch_lands_in_entry() {
        let (equipment, transport) = setup();
        transport.insert(EQUIPMENT, json!({"id": "e-3", "name": 42}));

        let query = equipment.use_list(Params::new());
        let result = query.fetch().await;
        assert!(matches!(result.error, Some(Error::DecodeError(_))));

        let entry = equipment.cache().resolve(query.key().expect("Enabled"));
        assert!(entry.is_error());
    }

    #[tokio::test]
    async fn test_invalidate_lists_only_touches_lists() {
        let (equipment, _) = setup();

        equipment.use_list(Params::new()).fetch().await;
        equipment.use_detail(Some(&"e-1".to_string())).fetch().await;

        assert_eq!(equipment.invalidate_lists(), 1);
        let detail = equipment.cache().resolve(&equipment.detail_key(&"e-1".to_string()));
        assert!(!detail.is_stale);
    }
}
