//! Field access and the pure list-shaping functions.

use super::state::SortDirection;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// A field value as seen by search and sort.
///
/// Integers keep their exact value so large ids order correctly; `Number`
/// holds everything that only fits a float.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i128),
    Number(f64),
    Text(Cow<'a, str>),
    Bool(bool),
}

impl<'a> FieldValue<'a> {
    /// Read a JSON value. `null` counts as missing.
    ///
    /// Arrays and objects are compared by their JSON text.
    pub fn from_json(value: &'a Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Some(FieldValue::Integer(i.into())),
                (None, Some(u)) => Some(FieldValue::Integer(u.into())),
                _ => n.as_f64().map(FieldValue::Number),
            },
            Value::String(s) => Some(FieldValue::Text(Cow::Borrowed(s))),
            other => Some(FieldValue::Text(Cow::Owned(other.to_string()))),
        }
    }

    /// Numeric value as a float. Integers beyond 2^53 are rounded here;
    /// comparisons between two integers never go through this.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String form used for search and non-numeric comparison.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Integer(i) => Cow::Owned(i.to_string()),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Text(s) => Cow::Borrowed(s.as_ref()),
            FieldValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        }
    }
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(s: &'a str) -> Self {
        FieldValue::Text(Cow::Borrowed(s))
    }
}

impl<'a> From<&'a String> for FieldValue<'a> {
    fn from(s: &'a String) -> Self {
        FieldValue::Text(Cow::Borrowed(s.as_str()))
    }
}

impl From<String> for FieldValue<'_> {
    fn from(s: String) -> Self {
        FieldValue::Text(Cow::Owned(s))
    }
}

impl From<bool> for FieldValue<'_> {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

macro_rules! impl_number_field {
    ($variant:ident as $repr:ty: $($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue<'_> {
                fn from(n: $ty) -> Self {
                    FieldValue::$variant(n as $repr)
                }
            }
        )*
    };
}

impl_number_field!(Integer as i128: i32, i64, u32, u64, usize);
impl_number_field!(Number as f64: f32, f64);

/// Records whose fields can be looked up by name.
///
/// Implemented for JSON objects and string-keyed maps of JSON values.
/// Typed records implement it by matching on the names a view uses:
///
/// ```
/// use query_kit::filter::{matches_search, FieldValue, Fields};
///
/// struct Bid {
///     title: String,
///     amount: u64,
///     client: Option<String>,
/// }
///
/// impl Fields for Bid {
///     fn field(&self, name: &str) -> Option<FieldValue<'_>> {
///         match name {
///             "title" => Some((&self.title).into()),
///             "amount" => Some(self.amount.into()),
///             "client" => self.client.as_ref().map(Into::into),
///             _ => None,
///         }
///     }
/// }
///
/// let bid = Bid { title: "Roof repair".into(), amount: 1200, client: None };
/// assert!(matches_search(&bid, "ROOF", &["client", "title"]));
/// assert!(matches_search(&bid, "120", &["amount"]));
/// ```
pub trait Fields {
    /// Value of field `name`, `None` when missing or null.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

impl Fields for Value {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match self {
            Value::Object(map) => map.field(name),
            _ => None,
        }
    }
}

impl Fields for Map<String, Value> {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        self.get(name).and_then(FieldValue::from_json)
    }
}

impl<S: BuildHasher> Fields for HashMap<String, Value, S> {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        self.get(name).and_then(FieldValue::from_json)
    }
}

impl Fields for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        self.get(name).and_then(FieldValue::from_json)
    }
}

impl<T: Fields + ?Sized> Fields for &T {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        (**self).field(name)
    }
}

/// Check if any of the named fields contains `query` (case-insensitive).
///
/// Returns `true` when:
/// - `query` is empty, or
/// - at least one field, in its string form, contains `query`.
///
/// Missing and null fields never match but never fail either.
pub fn matches_search<R: Fields + ?Sized>(record: &R, query: &str, fields: &[&str]) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    fields.iter().any(|name| {
        record
            .field(name)
            .is_some_and(|value| value.as_text().to_lowercase().contains(&needle))
    })
}

/// Check the record belongs to `tab`.
///
/// `"all"` and the empty tab match everything; otherwise the field's string
/// form must equal the tab, ignoring case.
pub fn matches_tab<R: Fields + ?Sized>(record: &R, field: &str, tab: &str) -> bool {
    if tab.is_empty() || tab.eq_ignore_ascii_case("all") {
        return true;
    }
    record
        .field(field)
        .is_some_and(|value| value.as_text().to_lowercase() == tab.to_lowercase())
}

/// Sorted copy of `items` by `field`. The input is never modified.
///
/// The sort is stable. An empty `field` returns the items in their
/// original order. Ordering rules:
/// 1. two numbers compare numerically, integers exactly;
/// 2. anything else compares by lowercase string form;
/// 3. missing or null values go last in both directions.
///
/// `Desc` reverses rules 1 and 2 only.
pub fn sort_items<R: Fields + Clone>(items: &[R], field: &str, direction: SortDirection) -> Vec<R> {
    let mut sorted = items.to_vec();
    if field.is_empty() {
        return sorted;
    }
    sorted.sort_by(|a, b| compare_fields(a.field(field), b.field(field), direction));
    sorted
}

/// Comparator behind [`sort_items`].
pub fn compare_fields(
    a: Option<FieldValue<'_>>,
    b: Option<FieldValue<'_>>,
    direction: SortDirection,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = match (&a, &b) {
                (FieldValue::Integer(x), FieldValue::Integer(y)) => x.cmp(y),
                _ => match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => a
                        .as_text()
                        .to_lowercase()
                        .cmp(&b.as_text().to_lowercase()),
                },
            };
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}
