//! # query-kit
//!
//! A client-side data layer for dashboard list views: cached REST reads with
//! request de-duplication, mutations with automatic invalidation, and a
//! shared filter/sort/search engine.
//!
//! ## Features
//!
//! - **One cache, explicit:** [`QueryCache`] is a constructible store, cloned
//!   wherever it is needed. No hidden global state.
//! - **De-duplicated reads:** concurrent reads of the same query share one request
//! - **Stale-while-revalidate:** invalidation keeps the last good data visible
//! - **Uniform CRUD:** [`Resource`] turns a name and a base path into
//!   `use_list`, `use_detail`, `use_create`, `use_update` and `use_delete`
//! - **Transport agnostic:** in-memory transport for tests, reqwest behind the `http` feature
//! - **Shape agnostic filtering:** [`filter`] works on JSON objects, maps or your own types
//!
//! ## Quick Start
//!
//! ```no_run
//! use query_kit::filter::{use_filter_state, ListShape};
//! use query_kit::key::Params;
//! use query_kit::transport::InMemoryTransport;
//! use query_kit::{QueryCache, Resource, ResourceDescriptor, ResourceRecord};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! // 1. Define your record
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Bid {
//!     id: String,
//!     title: String,
//!     status: String,
//! }
//!
//! impl ResourceRecord for Bid {
//!     type Id = String;
//!     fn id(&self) -> Self::Id { self.id.clone() }
//! }
//!
//! #[tokio::main]
//! async fn main() -> query_kit::Result<()> {
//!     // 2. Wire one cache and one transport at the application root
//!     let cache = QueryCache::new();
//!     let transport = Arc::new(InMemoryTransport::new());
//!
//!     // 3. Describe the resource
//!     let bids: Resource<Bid> =
//!         Resource::new(ResourceDescriptor::new("bids", "/api/bids"), cache, transport);
//!
//!     // 4. Read and mutate through it
//!     let drafts = bids.use_list(Params::new().with("status", "draft"));
//!     bids.use_create()
//!         .mutate(&json!({"title": "Roof", "status": "draft"}))
//!         .await?;
//!     let result = drafts.fetch().await;
//!
//!     // 5. Shape the list for the view
//!     let mut filter = use_filter_state(None);
//!     filter.set_search("roof");
//!     let rows = result.data.unwrap_or_default();
//!     let values: Vec<_> = rows.iter().map(|b| json!({"title": b.title})).collect();
//!     let visible = filter.apply(&values, &ListShape::new(["title"]));
//!     assert_eq!(visible.len(), 1);
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

pub mod cache;
pub mod entry;
pub mod error;
pub mod filter;
pub mod key;
pub mod mutation;
pub mod observability;
pub mod query;
pub mod record;
pub mod resource;
pub mod strategy;
pub mod transport;

// Re-exports for convenience
pub use cache::{CacheConfig, CacheStats, QueryCache, QueryCacheBuilder, Subscription};
pub use entry::{CacheEntry, QueryStatus};
pub use error::{Error, Result};
pub use key::{OperationKind, Params, QueryKey};
pub use mutation::{CreateMutation, DeleteMutation, UpdateMutation};
pub use query::{Query, QueryResult};
pub use record::ResourceRecord;
pub use resource::{Resource, ResourceDescriptor};
pub use strategy::FetchStrategy;
pub use transport::{ApiRequest, Method, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
