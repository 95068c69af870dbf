//! Basic usage of the query layer against the in-memory transport.

use query_kit::filter::{use_filter_state, FilterConfig, ListShape, SortDirection};
use query_kit::observability::{FreshnessPolicy, LogMetrics};
use query_kit::transport::InMemoryTransport;
use query_kit::{Method, Params, QueryCache, Resource, ResourceDescriptor, ResourceRecord, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Example record: a work order on the dashboard
#[derive(Clone, Serialize, Deserialize, Debug)]
struct WorkOrder {
    id: String,
    title: String,
    status: String,
    priority: u32,
}

impl ResourceRecord for WorkOrder {
    type Id = String;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Query Kit - Basic Example ===\n");

    // 1. Wire the cache and transport once
    println!("1. Initializing cache and in-memory API...");
    let cache = QueryCache::builder()
        .freshness(FreshnessPolicy::Fixed(Duration::from_secs(30)))
        .metrics(Box::new(LogMetrics))
        .build();
    let api = InMemoryTransport::new().with_latency(Duration::from_millis(20));
    api.insert(
        "/api/work-orders",
        json!({"id": "w-1", "title": "Replace filters", "status": "open", "priority": 2}),
    );
    api.insert(
        "/api/work-orders",
        json!({"id": "w-2", "title": "Inspect boiler", "status": "closed", "priority": 1}),
    );
    let orders: Resource<WorkOrder> = Resource::new(
        ResourceDescriptor::new("work-orders", "/api/work-orders"),
        cache.clone(),
        Arc::new(api.clone()),
    );
    println!("   ✓ Ready\n");

    // 2. Two views ask for the same list at once
    println!("2. Two overlapping reads of the open list:");
    let open = orders.use_list(Params::new().with("status", "open"));
    let (a, b) = tokio::join!(open.fetch(), open.fetch());
    println!(
        "   ✓ {} + {} rows, {} request(s) sent\n",
        a.data.map_or(0, |d| d.len()),
        b.data.map_or(0, |d| d.len()),
        api.count(Method::Get)
    );

    // 3. Create invalidates the lists
    println!("3. Creating a work order:");
    let created = orders
        .use_create()
        .mutate(&json!({"title": "Patch roof", "status": "open", "priority": 3}))
        .await?;
    println!("   ✓ Created {} ({})", created.id, created.title);
    let rows = open.fetch().await.data.unwrap_or_default();
    println!("   ✓ Open list now has {} rows\n", rows.len());

    // 4. Detail comes straight from the cache seeded by create
    println!("4. Reading the new detail:");
    api.reset_requests();
    let detail = orders.use_detail(Some(&created.id)).fetch().await;
    println!(
        "   ✓ {:?} served with {} request(s)\n",
        detail.data.map(|d| d.title),
        api.request_count()
    );

    // 5. Shape the list for the table view
    println!("5. Filtering and sorting:");
    let mut filter = use_filter_state(Some(FilterConfig {
        active_sort: Some("priority".to_string()),
        sort_direction: Some(SortDirection::Desc),
        ..FilterConfig::default()
    }));
    filter.set_search("r");
    let values: Vec<_> = rows
        .iter()
        .map(|order| json!({"title": order.title, "priority": order.priority}))
        .collect();
    for row in filter.apply(&values, &ListShape::new(["title"])) {
        println!("   » {} (priority {})", row["title"], row["priority"]);
    }

    println!();
    cache.log_stats();
    println!("\n=== Example Complete ===\n");

    Ok(())
}
