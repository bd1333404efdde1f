//! A filter parameter embedded in a search form.
//!
//! The host form stores the parameter as a JSON string
//! (`{"values": [...], "ignored": [...], "filters": [...]}`). On mount the
//! previous value is revived: filters on fields that still exist are applied,
//! the rest are kept aside as invalid so the user can be told about them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::FilterBackend;
use crate::config::ServiceConfig;
use crate::data::filter::{filter_display, unknown_field_display, Filter, FilterSet, FilterValue};
use crate::data::model::Field;
use crate::error::Result;
use crate::service::{Commit, FilterService, FilterServiceAttrs};

// ---------------------------------------------------------------------------
// Persisted value
// ---------------------------------------------------------------------------

/// The value round-tripped through the host form field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParamValue {
    /// Terms of the filtered, non-ignored data.
    pub values: Vec<String>,
    /// Terms of the ignored data.
    pub ignored: Vec<String>,
    /// Active filters, without their selection cache.
    pub filters: Vec<Filter>,
}

/// Parse a previously stored value. Anything malformed is logged and treated
/// as absent.
pub fn parse_value(raw: &str) -> Option<FilterParamValue> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Previous filter value is malformed, ignoring it: {e}");
            None
        }
    }
}

/// Split revived filters into those whose field still exists and those whose
/// field does not.
pub fn partition_filters(
    fields: &BTreeMap<String, Field>,
    filters: Vec<Filter>,
) -> (Vec<Filter>, Vec<Filter>) {
    filters
        .into_iter()
        .partition(|filter| fields.contains_key(filter.field()))
}

// ---------------------------------------------------------------------------
// FilterParam
// ---------------------------------------------------------------------------

pub struct FilterParam<B> {
    name: String,
    service: FilterService<B>,
    revived: Vec<Filter>,
}

impl<B: FilterBackend> FilterParam<B> {
    /// Build the service for parameter `name` and revive `previous_value`.
    ///
    /// Ignored data and invalid filters are applied right away; call
    /// [`restore`](Self::restore) to apply the valid filters.
    pub fn mount(
        name: impl Into<String>,
        backend: B,
        attrs: FilterServiceAttrs,
        previous_value: Option<&str>,
        config: ServiceConfig,
    ) -> Self {
        let name = name.into();
        let service = FilterService::new(backend, attrs, config);
        let previous = previous_value.and_then(parse_value);

        let mut revived = Vec::new();
        if let Some(previous) = previous {
            let state = service.state();
            let (valid, invalid) = partition_filters(&state.field_map, previous.filters);
            if !invalid.is_empty() {
                log::info!(
                    "{name}: {} previously selected filter(s) no longer available",
                    invalid.len()
                );
                service.set_invalid_filters(invalid);
            }

            let ignored: HashSet<&str> = previous.ignored.iter().map(String::as_str).collect();
            if !ignored.is_empty() {
                let data = state
                    .data
                    .iter()
                    .filter(|d| ignored.contains(d.term.as_str()))
                    .cloned()
                    .collect();
                service.update_ignored_data(data);
            }
            revived = valid;
        }

        FilterParam {
            name,
            service,
            revived,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &FilterService<B> {
        &self.service
    }

    /// Apply the revived filters and open the first one's field.
    pub async fn restore(&self) -> Result<()> {
        if self.revived.is_empty() {
            return Ok(());
        }
        log::info!("{}: restoring {} filter(s)", self.name, self.revived.len());
        let filters: Vec<Arc<Filter>> = self.revived.iter().cloned().map(Arc::new).collect();
        let first = filters.first().map(|f| f.field().to_string());

        self.service.update_filters(filters).await?;
        if let Some(term) = first {
            self.service.select_field_by_term(&term).await?;
        }
        Ok(())
    }

    /// Set `field`'s filter to `value`, dropping it instead when it would not
    /// constrain anything.
    ///
    /// Whether a membership selection covers every value depends on the
    /// field's distribution, which is fetched first if it is not cached.
    pub async fn change_field_filter(&self, field: &Field, value: FilterValue) -> Result<Commit> {
        let distribution_len = match value {
            FilterValue::Member(_) if field.is_membership() => {
                self.service.field_distribution(field).await?.len()
            }
            _ => 0,
        };
        let state = self.service.state();
        let mut set = FilterSet::from_filters(state.filters.iter().cloned());
        set.replace(field, Filter::from_value(field, value), distribution_len);
        self.service.update_filters(set.into_vec()).await
    }

    /// Remove this exact filter instance.
    pub async fn remove_filter(&self, filter: &Arc<Filter>) -> Result<Commit> {
        let state = self.service.state();
        let mut set = FilterSet::from_filters(state.filters.iter().cloned());
        set.remove(filter);
        self.service.update_filters(set.into_vec()).await
    }

    /// The value to store in the host form.
    pub fn value(&self) -> FilterParamValue {
        let state = self.service.state();
        let ignored: Vec<String> = state.ignored_data.iter().map(|d| d.term.clone()).collect();
        FilterParamValue {
            values: state
                .filtered_not_ignored()
                .into_iter()
                .map(|d| d.term.clone())
                .collect(),
            ignored,
            filters: state.filters.iter().map(|f| f.stripped()).collect(),
        }
    }

    pub fn value_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.value())?)
    }

    /// Summaries of the active filters, in filter order.
    pub fn filter_displays(&self) -> Vec<String> {
        let state = self.service.state();
        state
            .filters
            .iter()
            .map(|filter| match state.field(filter.field()) {
                Some(field) => filter_display(field, &filter.value()),
                None => unknown_field_display(filter),
            })
            .collect()
    }

    /// Summaries of the filters that could not be revived.
    pub fn invalid_filter_displays(&self) -> Vec<String> {
        self.service
            .state()
            .invalid_filters
            .iter()
            .map(unknown_field_display)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::FieldType;

    #[test]
    fn malformed_values_are_treated_as_absent() {
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("not json"), None);
        assert_eq!(parse_value(r#"{"filters": []}"#), None);
        assert_eq!(parse_value(r#"{"values": [], "ignored": [], "filters": {}}"#), None);
    }

    #[test]
    fn well_formed_value_parses() {
        let value = parse_value(
            r#"{"values":["g1"],"ignored":["g2"],"filters":[{"kind":"member","field":"organism","values":["pf"]}]}"#,
        )
        .unwrap();
        assert_eq!(value.values, vec!["g1"]);
        assert_eq!(value.ignored, vec!["g2"]);
        assert_eq!(value.filters.len(), 1);
    }

    #[test]
    fn filters_on_missing_fields_are_invalid() {
        let organism = Field::new("organism", "Organism", FieldType::String);
        let fields: BTreeMap<String, Field> = [organism]
            .into_iter()
            .map(|f| (f.term.clone(), f))
            .collect();
        let (valid, invalid) = partition_filters(
            &fields,
            vec![
                Filter::member("organism", vec!["pf".into()]),
                Filter::range("obsolete", Some(1.0.into()), None),
            ],
        );
        assert_eq!(valid.len(), 1);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].field(), "obsolete");
    }
}
