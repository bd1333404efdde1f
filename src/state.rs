use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::data::distribution::{MemberSort, SortDirection};
use crate::data::filter::Filter;
use crate::data::model::{Datum, Distribution, Field, FieldMetadataMap, FieldValue};
use crate::data::tree::{make_tree, FieldTreeNode};

/// Sort key meaning "order results by datum term".
pub const PRIMARY_KEY: &str = "__primary_key__";

// ---------------------------------------------------------------------------
// Per-field UI state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldState {
    pub sort: MemberSort,
    pub search_term: String,
}

// ---------------------------------------------------------------------------
// FilterServiceState – immutable snapshot handed to subscribers
// ---------------------------------------------------------------------------

/// Snapshot of a filter widget.
///
/// Every transition produces a new snapshot; containers that did not change
/// keep their `Arc`, so `Arc::ptr_eq` tells a renderer what moved.
#[derive(Debug, Clone)]
pub struct FilterServiceState {
    /// Field ontology as a forest.
    pub fields: Arc<Vec<FieldTreeNode>>,
    /// Field term → field, for lookups.
    pub field_map: Arc<BTreeMap<String, Field>>,
    pub filters: Arc<Vec<Arc<Filter>>>,
    /// Revived filters whose field no longer exists; display only.
    pub invalid_filters: Arc<Vec<Filter>>,
    pub data: Arc<Vec<Datum>>,
    pub filtered_data: Arc<Vec<Datum>>,
    pub ignored_data: Arc<Vec<Datum>>,
    pub columns: Arc<Vec<Field>>,
    pub selected_field: Option<Field>,
    pub distribution_map: Arc<BTreeMap<String, Arc<Distribution>>>,
    pub field_metadata_map: Arc<FieldMetadataMap>,
    pub field_states: Arc<BTreeMap<String, FieldState>>,
    pub is_loading: bool,
    /// Message of the last failed operation, cleared by the next success.
    pub error: Option<String>,
}

impl FilterServiceState {
    pub fn new(
        fields: &[Field],
        data: Vec<Datum>,
        columns: Vec<Field>,
        field_metadata_map: FieldMetadataMap,
    ) -> Self {
        let data = Arc::new(data);
        FilterServiceState {
            fields: Arc::new(make_tree(fields)),
            field_map: Arc::new(fields.iter().map(|f| (f.term.clone(), f.clone())).collect()),
            filters: Arc::new(Vec::new()),
            invalid_filters: Arc::new(Vec::new()),
            filtered_data: data.clone(),
            data,
            ignored_data: Arc::new(Vec::new()),
            columns: Arc::new(columns),
            selected_field: None,
            distribution_map: Arc::new(BTreeMap::new()),
            field_metadata_map: Arc::new(field_metadata_map),
            field_states: Arc::new(BTreeMap::new()),
            is_loading: false,
            error: None,
        }
    }

    pub fn field(&self, term: &str) -> Option<&Field> {
        self.field_map.get(term)
    }

    pub fn filter_for(&self, term: &str) -> Option<&Arc<Filter>> {
        self.filters.iter().find(|f| f.field() == term)
    }

    /// The filter on the selected field, if any.
    pub fn selected_filter(&self) -> Option<&Arc<Filter>> {
        self.selected_field
            .as_ref()
            .and_then(|field| self.filter_for(&field.term))
    }

    pub fn distribution(&self, term: &str) -> Option<&Arc<Distribution>> {
        self.distribution_map.get(term)
    }

    pub fn field_state(&self, term: &str) -> FieldState {
        self.field_states.get(term).cloned().unwrap_or_default()
    }

    fn ignored_terms(&self) -> HashSet<&str> {
        self.ignored_data.iter().map(|d| d.term.as_str()).collect()
    }

    /// Filtered data the user has not excluded by hand.
    pub fn filtered_not_ignored(&self) -> Vec<&Datum> {
        let ignored = self.ignored_terms();
        self.filtered_data
            .iter()
            .filter(|d| !ignored.contains(d.term.as_str()))
            .collect()
    }

    /// Filtered data ordered for the results table, by datum term
    /// ([`PRIMARY_KEY`]) or by a column's smallest metadata value. Data
    /// without a value for the column sort after the rest when ascending.
    pub fn sorted_filtered_data(&self, sort_term: &str, direction: SortDirection) -> Vec<&Datum> {
        let mut sorted: Vec<&Datum> = self.filtered_data.iter().collect();
        if sort_term == PRIMARY_KEY {
            sorted.sort_by(|a, b| a.term.cmp(&b.term));
        } else {
            let metadata = self.field_metadata_map.get(sort_term);
            let key = |d: &Datum| -> FieldValue {
                metadata
                    .and_then(|m| m.get(&d.term))
                    .and_then(|values| values.iter().min().cloned())
                    .unwrap_or(FieldValue::Null)
            };
            sorted.sort_by_cached_key(|d| key(*d));
        }
        if direction == SortDirection::Desc {
            sorted.reverse();
        }
        sorted
    }
}
