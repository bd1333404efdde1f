use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FieldValue – a single metadata value of a datum for some field
// ---------------------------------------------------------------------------

/// A dynamically-typed field value as delivered by the metadata backend.
///
/// Dates travel as ISO-8601 strings (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`), which
/// order correctly as text. `Null` stands for "unknown" and always orders last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    String(String),
    Null,
}

// -- Manual Eq/Ord so we can put FieldValue in BTreeMap/BTreeSet --

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use FieldValue::*;
        fn discriminant(v: &FieldValue) -> u8 {
            match v {
                Number(_) => 0,
                String(_) => 1,
                Null => 2,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Number(a), Number(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for FieldValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FieldValue::String(s) => s.hash(state),
            FieldValue::Number(f) => f.to_bits().hash(state),
            FieldValue::Null => {}
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Number(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                write!(f, "{}", *v as i64)
            }
            FieldValue::Number(v) => write!(f, "{v}"),
            FieldValue::Null => write!(f, "unknown"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Try to interpret the value as an `f64` for averaging.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values of the same kind. Mixed kinds and nulls are unordered.
    pub fn partial_order(&self, other: &FieldValue) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => a.partial_cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Field – a typed, filterable attribute of the ontology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
}

/// A node of the field ontology. Only leaves carry data; the rest are
/// categories used to group leaves in the field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub term: String,
    pub display: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "isRange", default, skip_serializing_if = "Option::is_none")]
    pub is_range: Option<bool>,
}

impl Field {
    pub fn new(term: impl Into<String>, display: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            term: term.into(),
            display: display.into(),
            field_type,
            parent: None,
            is_range: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_range(mut self, is_range: bool) -> Self {
        self.is_range = Some(is_range);
        self
    }

    /// Membership semantics: string fields, and any field explicitly marked
    /// `isRange: false`. Everything else filters by range.
    pub fn is_membership(&self) -> bool {
        self.field_type == FieldType::String || self.is_range == Some(false)
    }
}

// ---------------------------------------------------------------------------
// Datum – one row of the searchable record set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Datum {
    pub term: String,
    pub display: String,
}

impl Datum {
    pub fn new(term: impl Into<String>, display: impl Into<String>) -> Self {
        Datum {
            term: term.into(),
            display: display.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Distribution – per-field histogram
// ---------------------------------------------------------------------------

/// One bucket of a field's distribution.
///
/// `filtered_count` counts rows matching every active filter except the one on
/// this field, so `count >= filtered_count` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEntry {
    pub value: FieldValue,
    pub count: usize,
    pub filtered_count: usize,
}

pub type Distribution = Vec<DistributionEntry>;

/// Field metadata: datum term → the datum's values for one field.
pub type Metadata = BTreeMap<String, Vec<FieldValue>>;

/// Field term → that field's [`Metadata`].
pub type FieldMetadataMap = BTreeMap<String, std::sync::Arc<Metadata>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_orders_after_everything() {
        let mut values = vec![
            FieldValue::Null,
            FieldValue::from("b"),
            FieldValue::from(3.0),
            FieldValue::from("a"),
        ];
        values.sort();
        assert_eq!(values.last(), Some(&FieldValue::Null));
        assert_eq!(values[0], FieldValue::Number(3.0));
        assert_eq!(values[1], FieldValue::from("a"));
    }

    #[test]
    fn integral_numbers_display_without_fraction() {
        assert_eq!(FieldValue::from(10.0).to_string(), "10");
        assert_eq!(FieldValue::from(2.5).to_string(), "2.5");
        assert_eq!(FieldValue::Null.to_string(), "unknown");
    }

    #[test]
    fn field_json_uses_wire_names() {
        let field: Field = serde_json::from_str(
            r#"{"term":"len","display":"Length","type":"number","parent":"props","isRange":true}"#,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::Number);
        assert_eq!(field.parent.as_deref(), Some("props"));
        assert!(!field.is_membership());

        let back = serde_json::to_value(&field).unwrap();
        assert_eq!(back["isRange"], serde_json::json!(true));
    }

    #[test]
    fn number_with_is_range_false_is_membership() {
        let field = Field::new("copies", "Copies", FieldType::Number).with_range(false);
        assert!(field.is_membership());
    }

    #[test]
    fn field_values_deserialize_untagged() {
        let values: Vec<FieldValue> = serde_json::from_str(r#"[1.5, "x", null]"#).unwrap();
        assert_eq!(
            values,
            vec![FieldValue::Number(1.5), FieldValue::from("x"), FieldValue::Null]
        );
    }
}
