/// Data layer: core types, loading, and filtering.
///
/// Architecture:
/// ```text
///  .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → fields, data, field metadata
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   tree    │  flat fields → ontology forest
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐      ┌──────────────┐
///   │  filter   │ ───► │ distribution │  per-field histograms
///   └──────────┘      └──────────────┘
/// ```

pub mod distribution;
pub mod filter;
pub mod loader;
pub mod model;
pub mod tree;
