//! Query key management utilities.
//!
//! A [`QueryKey`] identifies one cacheable request: the resource name, the
//! kind of operation and the request parameters. Parameters are normalized
//! before they become part of the key, so requests that mean the same thing
//! land on the same cache entry:
//!
//! - object keys are ordered, recursively;
//! - `null`, `""`, `[]` and `{}` values are dropped.
//!
//! ```
//! use query_kit::key::{Params, QueryKey};
//! use serde_json::json;
//!
//! let a = Params::from_serialize(&json!({"status": "draft", "page": 2})).unwrap();
//! let b = Params::from_serialize(&json!({"page": 2, "status": "draft", "q": ""})).unwrap();
//!
//! assert_eq!(QueryKey::list("bids", a), QueryKey::list("bids", b));
//! ```

use crate::error::{Error, Result};
use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of read operation a key describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Collection read: `GET {base_path}?params`
    List,
    /// Single record read: `GET {base_path}/{id}`
    Detail,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Detail => "detail",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized request parameters.
///
/// Always an object. Values are stored already normalized, so two `Params`
/// compare equal iff they produce the same cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Empty parameter set.
    pub fn new() -> Self {
        Params(Map::new())
    }

    /// Build params from anything serializable to a JSON object.
    ///
    /// `()` / `None` / `null` produce empty params.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParams` when the value is not an object, and
    /// `Error::DecodeError` when serialization itself fails.
    pub fn from_serialize<P: Serialize + ?Sized>(params: &P) -> Result<Self> {
        Params::try_from(serde_json::to_value(params)?)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, normalizing it. Empty values remove the key instead.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        match normalize_value(value.into()) {
            Some(value) => {
                self.0.insert(key, value);
            }
            None => {
                self.0.remove(&key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Canonical JSON form used inside the serialized key.
    pub fn canonical(&self) -> String {
        // Sorted here too: `insert` appends in call order when serde_json
        // is built with `preserve_order`.
        let sorted: BTreeMap<&String, &Value> = self.0.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }

    /// Flatten params into query-string pairs.
    ///
    /// Strings are passed through, numbers and booleans are rendered with
    /// their JSON text, arrays repeat the key once per element, and nested
    /// objects are sent as canonical JSON.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.push((key.clone(), query_text(item)));
                    }
                }
                other => pairs.push((key.clone(), query_text(other))),
            }
        }
        pairs
    }
}

impl TryFrom<Value> for Params {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Params::new()),
            Value::Object(map) => Ok(Params(normalize_object(map))),
            other => Err(Error::InvalidParams(format!(
                "query params must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Normalize a JSON value for use in a key. `None` means "omit".
fn normalize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(normalize_object(map)),
                    other => other,
                })
                .collect(),
        )),
        Value::Object(map) => {
            let map = normalize_object(map);
            if map.is_empty() {
                None
            } else {
                Some(Value::Object(map))
            }
        }
        other => Some(other),
    }
}

fn normalize_object(map: Map<String, Value>) -> Map<String, Value> {
    // Rebuild through a BTreeMap so ordering holds even when serde_json
    // keeps insertion order.
    let sorted: BTreeMap<String, Value> = map
        .into_iter()
        .filter_map(|(k, v)| normalize_value(v).map(|v| (k, v)))
        .collect();
    sorted.into_iter().collect()
}

fn query_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Identity of a cacheable request: `(resource, operation, params)`.
///
/// Equality and hashing use the serialized form only.
#[derive(Clone, Debug)]
pub struct QueryKey {
    resource: String,
    operation: OperationKind,
    params: Params,
    serialized: String,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>, operation: OperationKind, params: Params) -> Self {
        let resource = resource.into();
        let serialized =
            build_composite(&[&resource, operation.as_str(), &params.canonical()]);
        QueryKey {
            resource,
            operation,
            params,
            serialized,
        }
    }

    /// Key for a collection read.
    pub fn list(resource: impl Into<String>, params: Params) -> Self {
        QueryKey::new(resource, OperationKind::List, params)
    }

    /// Key for a single-record read: params are `{ "id": "<id>" }`.
    ///
    /// Ids are always stored as strings so `7` and `"7"` share an entry.
    pub fn detail(resource: impl Into<String>, id: &dyn fmt::Display) -> Self {
        QueryKey::new(
            resource,
            OperationKind::Detail,
            Params::new().with("id", id.to_string()),
        )
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Serialized form: `"{resource}:{operation}:{canonical params}"`.
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// True for any list key of `resource`, whatever its params.
    pub fn is_list_of(&self, resource: &str) -> bool {
        self.operation == OperationKind::List && self.resource == resource
    }

    /// True for the detail key of `resource` / `id`.
    pub fn is_detail_of(&self, resource: &str, id: &str) -> bool {
        self.operation == OperationKind::Detail
            && self.resource == resource
            && self.params.get("id").and_then(Value::as_str) == Some(id)
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.serialized == other.serialized
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.resource)?;
        tuple.serialize_element(&self.operation)?;
        tuple.serialize_element(&self.params)?;
        tuple.end()
    }
}

/// Build a composite key from multiple parts.
fn build_composite(parts: &[&str]) -> String {
    parts.join(":")
}
