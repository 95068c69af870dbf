//! Property-based tests for keys and list shaping.
//!
//! # Properties Tested
//!
//! 1. **Key Equality**: param insertion order never changes the cache key
//! 2. **Empty Values**: null / "" / [] / {} params never change the cache key
//! 3. **Stable Sort**: records with equal sort values keep their input order
//! 4. **Missing Last**: records without the sort field end up last, either direction
//! 5. **Search Totality**: `matches_search` never panics and honours the empty query

use proptest::prelude::*;
use query_kit::filter::{matches_search, sort_items, SortDirection};
use query_kit::{Params, QueryKey};
use serde_json::{json, Map, Value};

// ============================================================================
// Generators
// ============================================================================

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z]{1,8}".prop_map(Value::from),
    ]
}

fn arb_param_entries() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map("[a-z]{1,6}", arb_scalar(), 0..8)
        .prop_map(|map| map.into_iter().collect())
}

fn arb_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)]
}

/// Record with a position tag and an optional, low-cardinality sort value.
fn arb_records() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        prop_oneof![
            Just(None),
            (0i64..4).prop_map(|n| Some(json!(n))),
            prop_oneof![Just("a"), Just("B"), Just("b")].prop_map(|s| Some(json!(s))),
        ],
        0..24,
    )
    .prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(pos, value)| {
                let mut record = Map::new();
                record.insert("pos".to_string(), json!(pos));
                if let Some(value) = value {
                    record.insert("v".to_string(), value);
                }
                Value::Object(record)
            })
            .collect()
    })
}

fn pos(record: &Value) -> u64 {
    record["pos"].as_u64().unwrap_or(u64::MAX)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_key_ignores_insertion_order(entries in arb_param_entries()) {
        let forward: Params = entries.iter().cloned().collect();
        let backward: Params = entries.iter().rev().cloned().collect();

        let a = QueryKey::list("bids", forward);
        let b = QueryKey::list("bids", backward);
        prop_assert_eq!(a.as_str(), b.as_str());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_key_ignores_empty_values(
        entries in arb_param_entries(),
        empty in prop_oneof![Just(Value::Null), Just(json!("")), Just(json!([])), Just(json!({}))],
    ) {
        let plain: Params = entries.iter().cloned().collect();
        let padded = plain.clone().with("zz_empty", empty);

        prop_assert_eq!(QueryKey::list("bids", plain), QueryKey::list("bids", padded));
    }

    #[test]
    fn prop_sort_is_stable(records in arb_records(), direction in arb_direction()) {
        let sorted = sort_items(&records, "v", direction);
        prop_assert_eq!(sorted.len(), records.len());

        for pair in sorted.windows(2) {
            let same_value = pair[0].get("v").map(|v| v.to_string().to_lowercase())
                == pair[1].get("v").map(|v| v.to_string().to_lowercase());
            if same_value {
                prop_assert!(pos(&pair[0]) < pos(&pair[1]));
            }
        }
    }

    #[test]
    fn prop_missing_values_last(records in arb_records(), direction in arb_direction()) {
        let sorted = sort_items(&records, "v", direction);
        let first_missing = sorted.iter().position(|r| r.get("v").is_none());
        if let Some(first) = first_missing {
            prop_assert!(sorted[first..].iter().all(|r| r.get("v").is_none()));
        }
    }

    #[test]
    fn prop_search_is_total(
        record in prop::collection::btree_map("[a-z]{1,4}", arb_scalar(), 0..6),
        query in ".{0,6}",
        fields in prop::collection::vec("[a-z]{1,4}", 0..4),
    ) {
        let record: Map<String, Value> = record.into_iter().collect();
        let fields: Vec<&str> = fields.iter().map(String::as_str).collect();

        let matched = matches_search(&record, &query, &fields);
        if query.is_empty() {
            prop_assert!(matched);
        }
        if fields.is_empty() && !query.is_empty() {
            prop_assert!(!matched);
        }
    }
}
