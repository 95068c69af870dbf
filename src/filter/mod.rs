//! Filter, search and sort state shared by every list view.
//!
//! Two layers:
//!
//! - pure functions over any [`Fields`] record: [`matches_search`],
//!   [`matches_tab`] and [`sort_items`];
//! - [`FilterState`], the per-view container of search text, active tab,
//!   sort field, sort direction and view mode, created with
//!   [`use_filter_state`].
//!
//! ```
//! use query_kit::filter::{use_filter_state, ListShape};
//! use serde_json::json;
//!
//! let equipment = vec![
//!     json!({"name": "Crane", "status": "active", "hours": 120}),
//!     json!({"name": "Excavator", "status": "repair", "hours": 80}),
//!     json!({"name": "Crawler", "status": "active"}),
//! ];
//! let shape = ListShape::new(["name"]).with_tab_field("status");
//!
//! let mut state = use_filter_state(None);
//! state.set_active_tab("active");
//! state.set_search("cra");
//! state.set_active_sort("hours");
//!
//! let visible = state.apply(&equipment, &shape);
//! assert_eq!(visible[0]["name"], "Crane");
//! assert_eq!(visible[1]["name"], "Crawler");
//! ```

mod fields;
mod state;

pub use fields::{compare_fields, matches_search, matches_tab, sort_items, FieldValue, Fields};
pub use state::{
    use_filter_state, FilterConfig, FilterSnapshot, FilterState, FilteredList, ListShape,
    ListenerId, SortDirection, ViewMode,
};
