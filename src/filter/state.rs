//! Per-view filter state and the memoized list it derives.

use super::fields::{matches_search, matches_tab, sort_items, Fields};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// How a view lays out its records.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
    Table,
    /// View-specific layout, e.g. `"kanban"` or `"calendar"`.
    Custom(String),
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Grid => write!(f, "grid"),
            ViewMode::List => write!(f, "list"),
            ViewMode::Table => write!(f, "table"),
            ViewMode::Custom(name) => f.write_str(name),
        }
    }
}

/// Current values of a [`FilterState`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub search: String,
    pub active_tab: String,
    /// Field name, or empty for no sorting.
    pub active_sort: String,
    pub sort_direction: SortDirection,
    pub view_mode: ViewMode,
}

impl Default for FilterSnapshot {
    fn default() -> Self {
        FilterSnapshot {
            search: String::new(),
            active_tab: "all".to_string(),
            active_sort: String::new(),
            sort_direction: SortDirection::Asc,
            view_mode: ViewMode::Grid,
        }
    }
}

/// Initial values for a view's filter state. Unset fields keep the defaults.
///
/// ```
/// use query_kit::filter::{use_filter_state, FilterConfig, SortDirection, ViewMode};
///
/// let config: FilterConfig = serde_json::from_str(
///     r#"{"active_sort": "due_date", "sort_direction": "desc", "view_mode": "table"}"#,
/// ).unwrap();
///
/// let state = use_filter_state(Some(config));
/// assert_eq!(state.active_tab(), "all");
/// assert_eq!(state.sort_direction(), SortDirection::Desc);
/// assert_eq!(state.view_mode(), &ViewMode::Table);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub search: Option<String>,
    pub active_tab: Option<String>,
    pub active_sort: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub view_mode: Option<ViewMode>,
}

type Listener = Arc<dyn Fn(&FilterSnapshot, u64) + Send + Sync>;

/// Handle returned by [`FilterState::on_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Search, tab, sort and view-mode state of one list view.
///
/// Every setter changes exactly one field, bumps [`revision`](Self::revision)
/// once and calls each `on_change` listener once with the new values.
pub struct FilterState {
    values: FilterSnapshot,
    revision: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

/// Create filter state with defaults, overridden by `config`.
pub fn use_filter_state(config: Option<FilterConfig>) -> FilterState {
    FilterState::new(config.unwrap_or_default())
}

impl FilterState {
    pub fn new(config: FilterConfig) -> Self {
        let defaults = FilterSnapshot::default();
        FilterState {
            values: FilterSnapshot {
                search: config.search.unwrap_or(defaults.search),
                active_tab: config.active_tab.unwrap_or(defaults.active_tab),
                active_sort: config.active_sort.unwrap_or(defaults.active_sort),
                sort_direction: config.sort_direction.unwrap_or(defaults.sort_direction),
                view_mode: config.view_mode.unwrap_or(defaults.view_mode),
            },
            revision: 0,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn search(&self) -> &str {
        &self.values.search
    }

    pub fn active_tab(&self) -> &str {
        &self.values.active_tab
    }

    pub fn active_sort(&self) -> &str {
        &self.values.active_sort
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.values.sort_direction
    }

    pub fn view_mode(&self) -> &ViewMode {
        &self.values.view_mode
    }

    pub fn snapshot(&self) -> &FilterSnapshot {
        &self.values
    }

    /// Number of setter calls so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.values.search = search.into();
        self.changed();
    }

    pub fn set_active_tab(&mut self, tab: impl Into<String>) {
        self.values.active_tab = tab.into();
        self.changed();
    }

    /// Sort by `field`; empty clears sorting. Direction is left as is.
    pub fn set_active_sort(&mut self, field: impl Into<String>) {
        self.values.active_sort = field.into();
        self.changed();
    }

    pub fn toggle_sort_direction(&mut self) {
        self.values.sort_direction = self.values.sort_direction.toggled();
        self.changed();
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.values.view_mode = mode;
        self.changed();
    }

    /// Call `listener` with the new values and revision after every setter.
    pub fn on_change<L>(&mut self, listener: L) -> ListenerId
    where
        L: Fn(&FilterSnapshot, u64) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn changed(&mut self) {
        self.revision += 1;
        for (_, listener) in &self.listeners {
            listener(&self.values, self.revision);
        }
    }

    /// Tab, then search, then sort `items` according to the current state.
    pub fn apply<R: Fields + Clone>(&self, items: &[R], shape: &ListShape) -> Vec<R> {
        let search_fields: Vec<&str> = shape.search_fields.iter().map(String::as_str).collect();
        let visible: Vec<R> = items
            .iter()
            .filter(|item| match &shape.tab_field {
                Some(field) => matches_tab(*item, field, &self.values.active_tab),
                None => true,
            })
            .filter(|item| matches_search(*item, &self.values.search, &search_fields))
            .cloned()
            .collect();
        sort_items(&visible, &self.values.active_sort, self.values.sort_direction)
    }
}

impl Default for FilterState {
    fn default() -> Self {
        FilterState::new(FilterConfig::default())
    }
}

impl fmt::Debug for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterState")
            .field("values", &self.values)
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Which fields a view searches and which one its tabs filter on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListShape {
    pub search_fields: Vec<String>,
    /// Field compared against the active tab. No tab filtering when `None`.
    pub tab_field: Option<String>,
}

impl ListShape {
    pub fn new<I, S>(search_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ListShape {
            search_fields: search_fields.into_iter().map(Into::into).collect(),
            tab_field: None,
        }
    }

    pub fn with_tab_field(mut self, field: impl Into<String>) -> Self {
        self.tab_field = Some(field.into());
        self
    }
}

/// Derived collection of a view, recomputed once per filter revision.
///
/// Bound to one [`FilterState`]: revisions of different states are not
/// comparable.
#[derive(Clone, Debug)]
pub struct FilteredList<R> {
    items: Vec<R>,
    shape: ListShape,
    derived: Option<(u64, Vec<R>)>,
    evaluations: usize,
}

impl<R: Fields + Clone> FilteredList<R> {
    pub fn new(items: Vec<R>, shape: ListShape) -> Self {
        FilteredList {
            items,
            shape,
            derived: None,
            evaluations: 0,
        }
    }

    /// Replace the source items, e.g. after a refetch.
    pub fn set_items(&mut self, items: Vec<R>) {
        self.items = items;
        self.derived = None;
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    /// Filtered and sorted items for `state`.
    pub fn get(&mut self, state: &FilterState) -> &[R] {
        let stale = !matches!(&self.derived, Some((revision, _)) if *revision == state.revision());
        if stale {
            let derived = state.apply(&self.items, &self.shape);
            self.evaluations += 1;
            self.derived = Some((state.revision(), derived));
        }
        match &self.derived {
            Some((_, derived)) => derived,
            None => &[],
        }
    }

    /// How many times the derived list was computed.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}
