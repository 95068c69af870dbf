//! Core record trait that every resource type must implement.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

/// Trait for records served by a REST resource.
///
/// Records travel as JSON, so they must round-trip through serde. The id is
/// used to build detail keys (`{resource}:detail:{"id":"<id>"}`) and the
/// `{base_path}/{id}` paths of detail, update and delete requests.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use query_kit::ResourceRecord;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Bid {
///     pub id: String,
///     pub title: String,
///     pub status: String,
/// }
///
/// impl ResourceRecord for Bid {
///     type Id = String;
///
///     fn id(&self) -> Self::Id {
///         self.id.clone()
///     }
/// }
/// ```
pub trait ResourceRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Type of the record's id (typically String, u64 or UUID)
    type Id: Display + Clone + Send + Sync + 'static;

    /// Return the record's id.
    fn id(&self) -> Self::Id;
}

/// Untyped records: the id is read from the `"id"` field.
///
/// String ids are used as-is, any other JSON value is rendered as text, and a
/// missing id yields an empty string.
impl ResourceRecord for Value {
    type Id = String;

    fn id(&self) -> Self::Id {
        match self.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}
