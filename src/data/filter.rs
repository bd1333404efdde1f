use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::model::{Datum, Field, FieldMetadataMap, FieldValue, Metadata};

// ---------------------------------------------------------------------------
// Filter – one constraint on one field
// ---------------------------------------------------------------------------

/// Inclusive bounds of a range filter. An absent bound is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<FieldValue>,
}

impl RangeValue {
    pub fn new(min: Option<FieldValue>, max: Option<FieldValue>) -> Self {
        // A JSON `null` bound means "unbounded", same as a missing one.
        RangeValue {
            min: min.filter(|v| !v.is_null()),
            max: max.filter(|v| !v.is_null()),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Whether `value` falls within the bounds. Unknown values never do.
    ///
    /// A string upper bound includes every value it is a prefix of, so a
    /// partial date such as `"2012"` covers all of 2012.
    pub fn contains(&self, value: &FieldValue) -> bool {
        if value.is_null() {
            return false;
        }
        let above_min = match &self.min {
            Some(min) => matches!(
                value.partial_order(min),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            None => true,
        };
        let below_max = match &self.max {
            Some(max) => matches!(
                upper_bound_order(value, max),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            None => true,
        };
        above_min && below_max
    }
}

/// Order `value` against an upper bound, comparing strings only over the
/// bound's length.
fn upper_bound_order(value: &FieldValue, max: &FieldValue) -> Option<std::cmp::Ordering> {
    match (value, max) {
        (FieldValue::String(v), FieldValue::String(m)) => {
            let head = v.get(..m.len()).unwrap_or(v);
            Some(head.cmp(m.as_str()))
        }
        _ => value.partial_order(max),
    }
}

/// The user's constraint on a field, before it is bound to a field term.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Member(Vec<FieldValue>),
    Range(RangeValue),
}

/// An active filter. Filters combine with AND semantics regardless of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Filter {
    Member {
        field: String,
        values: Vec<FieldValue>,
        /// Data matching this filter alone; filled in by the service and
        /// never persisted.
        #[serde(skip)]
        selection: Option<Arc<Vec<Datum>>>,
    },
    Range {
        field: String,
        value: RangeValue,
        #[serde(skip)]
        selection: Option<Arc<Vec<Datum>>>,
    },
}

impl Filter {
    pub fn member(field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Filter::Member {
            field: field.into(),
            values,
            selection: None,
        }
    }

    pub fn range(
        field: impl Into<String>,
        min: Option<FieldValue>,
        max: Option<FieldValue>,
    ) -> Self {
        Filter::Range {
            field: field.into(),
            value: RangeValue::new(min, max),
            selection: None,
        }
    }

    pub fn from_value(field: &Field, value: FilterValue) -> Self {
        match value {
            FilterValue::Member(values) => Filter::member(field.term.clone(), values),
            FilterValue::Range(range) => Filter::Range {
                field: field.term.clone(),
                value: range,
                selection: None,
            },
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Filter::Member { field, .. } | Filter::Range { field, .. } => field,
        }
    }

    pub fn value(&self) -> FilterValue {
        match self {
            Filter::Member { values, .. } => FilterValue::Member(values.clone()),
            Filter::Range { value, .. } => FilterValue::Range(value.clone()),
        }
    }

    pub fn selection(&self) -> Option<&Arc<Vec<Datum>>> {
        match self {
            Filter::Member { selection, .. } | Filter::Range { selection, .. } => {
                selection.as_ref()
            }
        }
    }

    /// A copy of this filter carrying `selection`.
    pub fn with_selection(&self, data: Arc<Vec<Datum>>) -> Filter {
        let mut copy = self.clone();
        match &mut copy {
            Filter::Member { selection, .. } | Filter::Range { selection, .. } => {
                *selection = Some(data)
            }
        }
        copy
    }

    /// A copy of this filter without its selection cache.
    pub fn stripped(&self) -> Filter {
        let mut copy = self.clone();
        match &mut copy {
            Filter::Member { selection, .. } | Filter::Range { selection, .. } => *selection = None,
        }
        copy
    }

    /// Equality of the constraint itself, ignoring the selection cache.
    pub fn same_constraint(&self, other: &Filter) -> bool {
        self.field() == other.field() && self.value() == other.value()
    }

    /// Whether a datum whose values for this filter's field are `values`
    /// passes. A datum with no values counts as having the unknown value.
    pub fn matches_values(&self, values: &[FieldValue]) -> bool {
        const UNKNOWN: &[FieldValue] = &[FieldValue::Null];
        let values = if values.is_empty() { UNKNOWN } else { values };
        match self {
            Filter::Member { values: wanted, .. } => values.iter().any(|v| wanted.contains(v)),
            Filter::Range { value, .. } => values.iter().any(|v| value.contains(v)),
        }
    }

    /// Whether `datum` passes, looking its values up in the field's metadata.
    pub fn matches(&self, datum: &Datum, metadata: Option<&Metadata>) -> bool {
        let values = metadata
            .and_then(|m| m.get(&datum.term))
            .map(Vec::as_slice)
            .unwrap_or_default();
        self.matches_values(values)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.same_constraint(other)
    }
}

// ---------------------------------------------------------------------------
// FilterSet – the active filters, at most one per field
// ---------------------------------------------------------------------------

/// Ordered collection of active filters. Order records user interaction and
/// carries no meaning for matching.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Arc<Filter>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a list, keeping only the last filter for each field.
    pub fn from_filters<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = Arc<Filter>>,
    {
        let mut set = FilterSet::new();
        for filter in filters {
            set.filters.retain(|f| f.field() != filter.field());
            set.filters.push(filter);
        }
        set
    }

    pub fn into_vec(self) -> Vec<Arc<Filter>> {
        self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&Arc<Filter>> {
        self.filters.iter().find(|f| f.field() == term)
    }

    /// Drop any filter on `field`, then append `filter` unless it is trivial
    /// given the field's distribution size.
    pub fn replace(&mut self, field: &Field, filter: Filter, distribution_len: usize) {
        self.filters.retain(|f| f.field() != field.term);
        if should_add_filter(field, &filter.value(), distribution_len) {
            self.filters.push(Arc::new(filter));
        }
    }

    /// Remove exactly this filter instance.
    pub fn remove(&mut self, filter: &Arc<Filter>) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| !Arc::ptr_eq(f, filter));
        before != self.filters.len()
    }
}

/// Whether a filter with `value` on `field` constrains anything.
///
/// Selecting every distribution value of a membership field is the same as
/// not filtering it, and a range with neither bound set matches everything.
pub fn should_add_filter(field: &Field, value: &FilterValue, distribution_len: usize) -> bool {
    match value {
        FilterValue::Member(values) if field.is_membership() => values.len() != distribution_len,
        FilterValue::Range(range) if !field.is_membership() => !range.is_unbounded(),
        // Value shape disagrees with the field; keep it and let display flag it.
        FilterValue::Member(_) | FilterValue::Range(_) => true,
    }
}

/// Conjunction of all filters over the datum's metadata.
pub fn datum_passes<'a, I>(datum: &Datum, filters: I, metadata: &FieldMetadataMap) -> bool
where
    I: IntoIterator<Item = &'a Arc<Filter>>,
{
    filters
        .into_iter()
        .all(|f| f.matches(datum, metadata.get(f.field()).map(Arc::as_ref)))
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Human-readable summary of a filter, as shown in the filter list.
pub fn filter_display(field: &Field, value: &FilterValue) -> String {
    match value {
        FilterValue::Range(range) => {
            let bound = |v: &Option<FieldValue>| v.as_ref().map(ToString::to_string);
            match (bound(&range.min), bound(&range.max)) {
                (None, Some(max)) => format!("{} is less than {max}", field.display),
                (Some(min), None) => format!("{} is greater than {min}", field.display),
                (Some(min), Some(max)) => format!("{} is between {min} and {max}", field.display),
                (None, None) => format!("{} is any value", field.display),
            }
        }
        FilterValue::Member(values) if values.is_empty() => {
            format!("No {} selected", field.display)
        }
        FilterValue::Member(values) => {
            let joined = values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} is {joined}", field.display)
        }
    }
}

/// Summary for a filter whose field is no longer part of the ontology.
pub fn unknown_field_display(filter: &Filter) -> String {
    let value = match filter {
        Filter::Member { values, .. } => serde_json::to_string(values),
        Filter::Range { value, .. } => serde_json::to_string(value),
    }
    .unwrap_or_default();
    format!("{} is {value}", filter.field())
}
