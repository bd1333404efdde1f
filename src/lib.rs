//! Faceted attribute filtering for WDK record browsers.
//!
//! A [`FilterService`] owns the filter state of one search parameter: the
//! field ontology, the active filters, the filtered data and per-field value
//! distributions. A [`FilterBackend`] supplies distributions, filtered data and
//! field metadata, either in memory ([`ClientSideBackend`]) or from a server.

pub mod backend;
pub mod config;
pub mod data;
pub mod error;
pub mod param;
pub mod service;
pub mod state;

pub use backend::{ClientSideBackend, FilterBackend};
pub use config::ServiceConfig;
pub use data::filter::{
    filter_display, should_add_filter, Filter, FilterSet, FilterValue, RangeValue,
};
pub use data::model::{Datum, DistributionEntry, Field, FieldType, FieldValue};
pub use error::{FilterError, Result};
pub use param::{FilterParam, FilterParamValue};
pub use service::{Commit, FilterService, FilterServiceAttrs, Subscription};
pub use state::FilterServiceState;
