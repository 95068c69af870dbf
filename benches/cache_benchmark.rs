//! Performance benchmarks for query-kit
//!
//! This benchmark suite measures:
//! - QueryCache reads (fresh hit, forced refetch)
//! - QueryKey normalization across param sizes
//! - List shaping (search, sort) across collection sizes
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use query_kit::filter::{matches_search, sort_items, use_filter_state, ListShape, SortDirection};
use query_kit::{Params, QueryCache, QueryKey};
use serde_json::{json, Value};
use std::hint::black_box;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

fn records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("b-{}", i),
                "title": format!("Bid {} for roof section {}", i, i % 17),
                "status": if i % 3 == 0 { "draft" } else { "sent" },
                "amount": (i * 7919) % 10_000,
            })
        })
        .collect()
}

fn params(size: usize) -> Params {
    (0..size)
        .rev()
        .map(|i| (format!("field_{}", i), json!(i)))
        .collect()
}

// ============================================================================
// Group 1: QueryCache
// ============================================================================

fn cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_cache");

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for size in [10, 100, 1_000].iter() {
        // Fresh entry: no loader call
        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("fetch_hit", size), size, |b, &size| {
                let cache = QueryCache::new();
                let key = QueryKey::list("bids", Params::new());
                cache.write(&key, Value::Array(records(size)));

                b.to_async(&rt).iter(|| async {
                    cache
                        .fetch_if_needed(black_box(&key), || async { Ok(Value::Null) })
                        .await
                        .expect("Failed to fetch")
                });
            });

        // Forced refetch: spawn + settle + notify
        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("refetch", size), size, |b, &size| {
                let cache = QueryCache::new();
                let key = QueryKey::list("bids", Params::new());
                let data = Value::Array(records(size));

                b.to_async(&rt).iter(|| async {
                    let data = data.clone();
                    cache
                        .refetch(black_box(&key), move || async move { Ok(data) })
                        .await
                        .expect("Failed to refetch")
                });
            });
    }

    group.bench_function("invalidate_1000_entries", |b| {
        let cache = QueryCache::new();
        for i in 0..1_000 {
            cache.write(&QueryKey::list("bids", Params::new().with("page", i)), json!([]));
        }

        b.iter(|| cache.invalidate(|key| black_box(key.is_list_of("bids"))));
    });

    group.finish();
}

// ============================================================================
// Group 2: Key Normalization
// ============================================================================

fn key_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_key");

    for size in [1, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("list_key", size), size, |b, &size| {
            let params = params(size);
            b.iter(|| QueryKey::list(black_box("bids"), black_box(params.clone())));
        });

        group.bench_with_input(BenchmarkId::new("from_serialize", size), size, |b, &size| {
            let raw = Value::Object(
                (0..size)
                    .map(|i| (format!("field_{}", i), json!({"nested": i, "empty": ""})))
                    .collect(),
            );
            b.iter(|| Params::from_serialize(black_box(&raw)).expect("Valid params"));
        });
    }

    group.finish();
}

// ============================================================================
// Group 3: List Shaping
// ============================================================================

fn filter_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for size in [100, 1_000, 10_000].iter() {
        let items = records(*size);

        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("sort_items", size), &items, |b, items| {
                b.iter(|| sort_items(black_box(items), "amount", SortDirection::Desc));
            });

        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("matches_search", size), &items, |b, items| {
                b.iter(|| {
                    items
                        .iter()
                        .filter(|r| matches_search(*r, black_box("Section 1"), &["title", "status"]))
                        .count()
                });
            });

        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("apply", size), &items, |b, items| {
                let mut state = use_filter_state(None);
                state.set_active_tab("sent");
                state.set_search("roof");
                state.set_active_sort("title");
                let shape = ListShape::new(["title"]).with_tab_field("status");

                b.iter(|| state.apply(black_box(items), &shape));
            });
    }

    group.finish();
}

criterion_group!(benches, cache_benchmarks, key_benchmarks, filter_benchmarks);
criterion_main!(benches);
