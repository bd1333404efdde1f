//! Collaborators the filter service fetches from.
//!
//! ```text
//!   FilterService ──► FilterBackend ──┬─► ClientSideBackend  (in-memory)
//!                                     └─► server transport   (embedder's)
//! ```
//!
//! Every method has a default body that fails with
//! [`FilterError::NotImplemented`]: a backend must override all three.

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::distribution::compute_distribution;
use crate::data::filter::{datum_passes, Filter};
use crate::data::model::{Datum, Distribution, Field, FieldMetadataMap, Metadata};
use crate::error::{FilterError, Result};

#[async_trait]
pub trait FilterBackend: Send + Sync {
    /// Distribution of `field` given the active `filters`. `filtered_count`
    /// must ignore any filter on `field` itself.
    async fn field_distribution(
        &self,
        field: &Field,
        filters: &[Arc<Filter>],
    ) -> Result<Distribution> {
        let _ = (field, filters);
        Err(FilterError::NotImplemented {
            method: "getFieldDistribution",
        })
    }

    /// Data matching every filter in `filters`.
    async fn filtered_data(&self, filters: &[Arc<Filter>]) -> Result<Vec<Datum>> {
        let _ = filters;
        Err(FilterError::NotImplemented {
            method: "getFilteredData",
        })
    }

    /// Values of `field` for each datum.
    async fn field_metadata(&self, field: &Field) -> Result<Metadata> {
        let _ = field;
        Err(FilterError::NotImplemented {
            method: "getFieldMetadata",
        })
    }
}

// ---------------------------------------------------------------------------
// ClientSideBackend – everything is already in memory
// ---------------------------------------------------------------------------

/// Filters the full data set in memory using a preloaded metadata map.
#[derive(Debug, Clone)]
pub struct ClientSideBackend {
    data: Arc<Vec<Datum>>,
    metadata: FieldMetadataMap,
}

impl ClientSideBackend {
    pub fn new(data: Arc<Vec<Datum>>, metadata: FieldMetadataMap) -> Self {
        ClientSideBackend { data, metadata }
    }

    fn metadata_for(&self, field: &Field) -> Result<&Arc<Metadata>> {
        self.metadata
            .get(&field.term)
            .ok_or_else(|| FilterError::UnknownField {
                term: field.term.clone(),
            })
    }
}

#[async_trait]
impl FilterBackend for ClientSideBackend {
    async fn field_distribution(
        &self,
        field: &Field,
        filters: &[Arc<Filter>],
    ) -> Result<Distribution> {
        self.metadata_for(field)?;
        Ok(compute_distribution(&field.term, &self.data, filters, &self.metadata))
    }

    async fn filtered_data(&self, filters: &[Arc<Filter>]) -> Result<Vec<Datum>> {
        Ok(self
            .data
            .iter()
            .filter(|datum| datum_passes(datum, filters, &self.metadata))
            .cloned()
            .collect())
    }

    async fn field_metadata(&self, field: &Field) -> Result<Metadata> {
        self.metadata_for(field).map(|m| m.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{FieldType, FieldValue};

    struct Bare;

    impl FilterBackend for Bare {}

    fn backend() -> ClientSideBackend {
        let data = Arc::new(vec![
            Datum::new("g1", "G1"),
            Datum::new("g2", "G2"),
            Datum::new("g3", "G3"),
        ]);
        let organism: Metadata = [("g1", "pf"), ("g2", "pv"), ("g3", "pf")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), vec![FieldValue::from(v)]))
            .collect();
        let length: Metadata = [("g1", 10.0), ("g2", 20.0), ("g3", 30.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), vec![FieldValue::from(v)]))
            .collect();
        let metadata = FieldMetadataMap::from([
            ("organism".to_string(), Arc::new(organism)),
            ("length".to_string(), Arc::new(length)),
        ]);
        ClientSideBackend::new(data, metadata)
    }

    fn terms(data: &[Datum]) -> Vec<&str> {
        data.iter().map(|d| d.term.as_str()).collect()
    }

    #[tokio::test]
    async fn bare_backend_reports_missing_overrides() {
        let field = Field::new("f", "F", FieldType::String);
        let err = Bare.field_distribution(&field, &[]).await.unwrap_err();
        assert!(matches!(err, FilterError::NotImplemented { method: "getFieldDistribution" }));
        assert!(matches!(
            Bare.filtered_data(&[]).await,
            Err(FilterError::NotImplemented { method: "getFilteredData" })
        ));
        assert!(matches!(
            Bare.field_metadata(&field).await,
            Err(FilterError::NotImplemented { method: "getFieldMetadata" })
        ));
    }

    #[tokio::test]
    async fn filtering_is_a_conjunction_in_any_order() {
        let backend = backend();
        let a = Arc::new(Filter::member("organism", vec!["pf".into()]));
        let b = Arc::new(Filter::range("length", Some(15.0.into()), None));

        let ab = backend.filtered_data(&[a.clone(), b.clone()]).await.unwrap();
        let ba = backend.filtered_data(&[b, a]).await.unwrap();
        assert_eq!(terms(&ab), vec!["g3"]);
        assert_eq!(ab, ba);
    }

    #[tokio::test]
    async fn no_filters_returns_everything() {
        let data = backend().filtered_data(&[]).await.unwrap();
        assert_eq!(terms(&data), vec!["g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn unknown_field_is_rejected() {
        let field = Field::new("missing", "Missing", FieldType::String);
        let err = backend().field_metadata(&field).await.unwrap_err();
        assert!(matches!(err, FilterError::UnknownField { term } if term == "missing"));
    }
}
