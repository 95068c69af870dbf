//! In-memory REST transport (default, for tests and demos).
//!
//! Serves a JSON collection per base path with the usual REST semantics:
//!
//! | Request | Behaviour |
//! |---------|-----------|
//! | `GET {path}?k=v` | Records whose field `k` renders as `v` (repeated keys: any of) |
//! | `GET {path}/{id}` | The record, or 404 |
//! | `POST {path}` | Stores the body, assigning an `"id"` if missing; returns the record |
//! | `PATCH {path}/{id}` | Merges the body into the record; returns the record, or 404 |
//! | `DELETE {path}/{id}` | Removes the record, or 404 |
//!
//! Every request is recorded so tests can assert how many network calls a
//! cache interaction produced.
//!
//! A request is served the moment it arrives; configured latency only delays
//! the response. A slow read therefore answers with the records it saw on
//! arrival, even if a write lands while it is still on the wire.

use super::{ApiRequest, Method, Transport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct State {
    requests: Vec<ApiRequest>,
    failures: VecDeque<Error>,
    latency: Option<Duration>,
    method_latency: HashMap<Method, Duration>,
}

/// Thread-safe in-memory REST endpoint.
///
/// Clones share the same collections and request log.
///
/// # Example
///
/// ```no_run
/// use query_kit::transport::{ApiRequest, InMemoryTransport, Method, Transport};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> query_kit::Result<()> {
///     let transport = InMemoryTransport::new();
///     transport.insert("/api/bids", json!({"id": "b-1", "status": "draft"}));
///
///     let drafts = transport
///         .send(ApiRequest::new(Method::Get, "/api/bids")
///             .with_query(vec![("status".into(), "draft".into())]))
///         .await?;
///     assert_eq!(drafts.as_array().map(Vec::len), Some(1));
///     assert_eq!(transport.request_count(), 1);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryTransport {
    collections: Arc<DashMap<String, Vec<Value>>>,
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        InMemoryTransport {
            collections: Arc::new(DashMap::new()),
            state: Arc::new(Mutex::new(State::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Delay every response by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Delay responses to `method` by `latency`, overriding `with_latency`.
    pub fn with_method_latency(self, method: Method, latency: Duration) -> Self {
        self.lock().method_latency.insert(method, latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record directly, bypassing the request log.
    pub fn insert(&self, base_path: &str, record: Value) {
        self.collections
            .entry(collection_key(base_path))
            .or_default()
            .push(record);
    }

    /// Current records of a collection, in insertion order.
    pub fn records(&self, base_path: &str) -> Vec<Value> {
        self.collections
            .get(&collection_key(base_path))
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Make the next request fail with `error` instead of being served.
    pub fn fail_next(&self, error: Error) {
        self.lock().failures.push_back(error);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of requests received with `method`.
    pub fn count(&self, method: Method) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn reset_requests(&self) {
        self.lock().requests.clear();
    }

    fn serve(&self, request: &ApiRequest) -> Result<Value> {
        let key = collection_key(&request.base_path);
        match (request.method, request.id.as_deref()) {
            (Method::Get, None) => {
                let records = self.records(&request.base_path);
                Ok(Value::Array(
                    records
                        .into_iter()
                        .filter(|record| matches_query(record, &request.query))
                        .collect(),
                ))
            }
            (Method::Get, Some(id)) => self
                .collections
                .get(&key)
                .and_then(|records| records.iter().find(|r| record_id(r) == id).cloned())
                .ok_or_else(|| not_found(request)),
            (Method::Post, None) => {
                let mut record = body_object(request)?;
                if record_id_of(&record).is_empty() {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    record.insert("id".to_string(), Value::String(id.to_string()));
                }
                let record = Value::Object(record);
                self.collections
                    .entry(key)
                    .or_default()
                    .push(record.clone());
                Ok(record)
            }
            (Method::Patch, Some(id)) => {
                let patch = body_object(request)?;
                let mut records = self.collections.entry(key).or_default();
                let record = records
                    .iter_mut()
                    .find(|r| record_id(r) == id)
                    .ok_or_else(|| not_found(request))?;
                if let Value::Object(fields) = record {
                    for (field, value) in patch {
                        if field != "id" {
                            fields.insert(field, value);
                        }
                    }
                }
                Ok(record.clone())
            }
            (Method::Delete, Some(id)) => {
                let mut records = self.collections.entry(key).or_default();
                let before = records.len();
                records.retain(|r| record_id(r) != id);
                if records.len() == before {
                    return Err(not_found(request));
                }
                Ok(Value::Null)
            }
            _ => Err(Error::HttpError {
                status: 405,
                body: json!({"message": format!("method not allowed: {}", request)}),
            }),
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let (latency, failure) = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            let latency = state
                .method_latency
                .get(&request.method)
                .copied()
                .or(state.latency);
            (latency, state.failures.pop_front())
        };

        let result = match failure {
            Some(error) => {
                debug!("✗ InMemory {} -> injected failure: {}", request, error);
                Err(error)
            }
            None => {
                let result = self.serve(&request);
                match &result {
                    Ok(_) => debug!("✓ InMemory {}", request),
                    Err(e) => debug!("✗ InMemory {} -> {}", request, e),
                }
                result
            }
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        InMemoryTransport::new()
    }
}

fn collection_key(base_path: &str) -> String {
    base_path.trim_end_matches('/').to_string()
}

fn record_id(record: &Value) -> String {
    match record {
        Value::Object(fields) => record_id_of(fields),
        _ => String::new(),
    }
}

fn record_id_of(fields: &Map<String, Value>) -> String {
    match fields.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_query(record: &Value, query: &[(String, String)]) -> bool {
    let mut keys: Vec<&str> = query.iter().map(|(k, _)| k.as_str()).collect();
    keys.dedup();
    keys.into_iter().all(|key| {
        let Some(field) = record.get(key) else {
            return false;
        };
        let text = field_text(field);
        query
            .iter()
            .filter(|(k, _)| k == key)
            .any(|(_, expected)| *expected == text)
    })
}

fn body_object(request: &ApiRequest) -> Result<Map<String, Value>> {
    match &request.body {
        Some(Value::Object(fields)) => Ok(fields.clone()),
        _ => Err(Error::HttpError {
            status: 400,
            body: json!({"message": "request body must be a JSON object"}),
        }),
    }
}

fn not_found(request: &ApiRequest) -> Error {
    Error::HttpError {
        status: 404,
        body: json!({"message": format!("not found: {}", request.path())}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIDS: &str = "/api/bids";

    fn get(query: &[(&str, &str)]) -> ApiRequest {
        ApiRequest::new(Method::Get, BIDS).with_query(
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_list_filters_by_query() {
        let transport = InMemoryTransport::new();
        transport.insert(BIDS, json!({"id": "1", "status": "draft", "amount": 10}));
        transport.insert(BIDS, json!({"id": "2", "status": "sent", "amount": 20}));
        transport.insert(BIDS, json!({"id": "3", "status": "draft", "amount": 20}));

        let drafts = transport
            .send(get(&[("status", "draft")]))
            .await
            .expect("Failed to list");
        assert_eq!(drafts.as_array().map(Vec::len), Some(2));

        let draft_twenty = transport
            .send(get(&[("amount", "20"), ("status", "draft")]))
            .await
            .expect("Failed to list");
        assert_eq!(draft_twenty, json!([{"id": "3", "status": "draft", "amount": 20}]));

        let either = transport
            .send(get(&[("status", "draft"), ("status", "sent")]))
            .await
            .expect("Failed to list");
        assert_eq!(either.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let transport = InMemoryTransport::new();

        let created = transport
            .send(ApiRequest::new(Method::Post, BIDS).with_body(json!({"title": "Roof"})))
            .await
            .expect("Failed to create");
        assert_eq!(created["id"], "1");
        assert_eq!(transport.records(BIDS).len(), 1);

        let detail = transport
            .send(ApiRequest::new(Method::Get, BIDS).with_id("1"))
            .await
            .expect("Failed to get");
        assert_eq!(detail["title"], "Roof");
    }

    #[tokio::test]
    async fn test_patch_merges_fields() {
        let transport = InMemoryTransport::new();
        transport.insert(BIDS, json!({"id": "b-1", "title": "Roof", "status": "draft"}));

        let updated = transport
            .send(
                ApiRequest::new(Method::Patch, BIDS)
                    .with_id("b-1")
                    .with_body(json!({"status": "sent", "id": "ignored"})),
            )
            .await
            .expect("Failed to patch");
        assert_eq!(updated, json!({"id": "b-1", "title": "Roof", "status": "sent"}));
    }

    #[tokio::test]
    async fn test_delete_and_missing_record() {
        let transport = InMemoryTransport::new();
        transport.insert(BIDS, json!({"id": "b-1"}));

        let deleted = transport
            .send(ApiRequest::new(Method::Delete, BIDS).with_id("b-1"))
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Value::Null);

        let err = transport
            .send(ApiRequest::new(Method::Delete, BIDS).with_id("b-1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_post_requires_object_body() {
        let transport = InMemoryTransport::new();
        let err = transport
            .send(ApiRequest::new(Method::Post, BIDS).with_body(json!([1])))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_injected_failure_and_request_log() {
        let transport = InMemoryTransport::new();
        transport.fail_next(Error::NetworkError("connection refused".to_string()));

        let err = transport.send(get(&[])).await.unwrap_err();
        assert!(matches!(err, Error::NetworkError(_)));

        transport.send(get(&[])).await.expect("Second call succeeds");
        assert_eq!(transport.request_count(), 2);
        assert_eq!(transport.count(Method::Get), 2);
        assert_eq!(transport.count(Method::Post), 0);

        transport.reset_requests();
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_clone_shares_collections() {
        let transport1 = InMemoryTransport::new();
        let transport2 = transport1.clone();

        transport1.insert(BIDS, json!({"id": "b-1"}));
        assert_eq!(transport2.records(BIDS).len(), 1);
        assert_eq!(transport2.records("/api/bids/").len(), 1);
    }

    #[tokio::test]
    async fn test_default_assigns_ids_like_new() {
        let transport = InMemoryTransport::default();
        let created = transport
            .send(ApiRequest::new(Method::Post, BIDS).with_body(json!({"title": "Roof"})))
            .await
            .expect("Failed to create");
        assert_eq!(created["id"], "1");
    }

    #[tokio::test]
    async fn test_slow_read_answers_with_records_seen_on_arrival() {
        let transport = InMemoryTransport::new()
            .with_method_latency(Method::Get, Duration::from_millis(50));
        transport.insert(BIDS, json!({"id": "b-1"}));

        let read = tokio::spawn({
            let transport = transport.clone();
            async move { transport.send(get(&[])).await }
        });
        while transport.count(Method::Get) == 0 {
            tokio::task::yield_now().await;
        }

        transport
            .send(ApiRequest::new(Method::Post, BIDS).with_body(json!({"id": "b-2"})))
            .await
            .expect("Writes are not delayed");

        let seen = read.await.expect("Task failed").expect("Failed to list");
        assert_eq!(seen.as_array().map(Vec::len), Some(1));
        assert_eq!(transport.records(BIDS).len(), 2);
    }
}
