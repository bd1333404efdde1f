use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::model::{Datum, Field, FieldMetadataMap, FieldType, FieldValue, Metadata};
use crate::error::{FilterError, Result};
use crate::service::FilterServiceAttrs;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a filter dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.json` – `{ "fields": [...], "data": [...], "columns": [...], "metadata": {...} }`
/// * `.csv`  – `term`, `display`, then one column per field
pub fn load_file(path: &Path) -> Result<FilterServiceAttrs> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let attrs = match ext.as_str() {
        "json" => load_json(&std::fs::read_to_string(path)?)?,
        "csv" => load_csv(csv::Reader::from_path(path)?)?,
        other => {
            return Err(FilterError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Unsupported file extension: .{other}"),
            )))
        }
    };
    log::info!(
        "Loaded {} field(s) and {} datum/data from {}",
        attrs.fields.len(),
        attrs.data.len(),
        path.display()
    );
    Ok(attrs)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// {
///   "fields":   [{ "term": "organism", "display": "Organism", "type": "string" }],
///   "data":     [{ "term": "PF3D7_0100100", "display": "VAR" }],
///   "columns":  ["organism"],
///   "metadata": { "organism": { "PF3D7_0100100": "P. falciparum 3D7" } }
/// }
/// ```
///
/// Metadata cells may be a single value or an array of values.
#[derive(Deserialize)]
struct JsonDataset {
    fields: Vec<Field>,
    data: Vec<Datum>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, BTreeMap<String, JsonValue>>,
}

pub fn load_json(text: &str) -> Result<FilterServiceAttrs> {
    let dataset: JsonDataset = serde_json::from_str(text)?;

    let field_metadata_map = dataset
        .metadata
        .into_iter()
        .map(|(field, cells)| {
            let metadata: Metadata = cells
                .into_iter()
                .map(|(datum, cell)| (datum, json_to_values(cell)))
                .collect();
            (field, Arc::new(metadata))
        })
        .collect();

    let columns = resolve_columns(&dataset.fields, &dataset.columns)?;
    Ok(FilterServiceAttrs {
        fields: dataset.fields,
        data: dataset.data,
        columns,
        field_metadata_map,
    })
}

fn json_to_values(cell: JsonValue) -> Vec<FieldValue> {
    match cell {
        JsonValue::Array(items) => items.into_iter().map(json_to_value).collect(),
        JsonValue::Null => Vec::new(),
        other => vec![json_to_value(other)],
    }
}

fn json_to_value(val: JsonValue) -> FieldValue {
    match val {
        JsonValue::String(s) => FieldValue::String(s),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) => FieldValue::Number(f),
            None => FieldValue::String(n.to_string()),
        },
        JsonValue::Null => FieldValue::Null,
        other => FieldValue::String(other.to_string()),
    }
}

fn resolve_columns(fields: &[Field], terms: &[String]) -> Result<Vec<Field>> {
    terms
        .iter()
        .map(|term| {
            fields
                .iter()
                .find(|f| &f.term == term)
                .cloned()
                .ok_or_else(|| FilterError::UnknownField { term: term.clone() })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `term` and `display` identify each datum; every other column is a field
/// (display = header) whose cell is the datum's value. Empty cells are
/// unknown. Field types are guessed from the cells.
pub fn load_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<FilterServiceAttrs> {
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let term_idx = header_position(&headers, "term")?;
    let display_idx = header_position(&headers, "display")?;
    let field_cols: Vec<(usize, &String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != term_idx && *i != display_idx)
        .collect();

    let mut data = Vec::new();
    let mut cells: BTreeMap<&str, BTreeMap<String, String>> = BTreeMap::new();
    for result in reader.records() {
        let record = result?;
        let term = record.get(term_idx).unwrap_or("").to_string();
        let display = record.get(display_idx).unwrap_or("").to_string();
        for (col_idx, header) in &field_cols {
            let value = record.get(*col_idx).unwrap_or("").trim();
            if !value.is_empty() {
                cells
                    .entry(header.as_str())
                    .or_default()
                    .insert(term.clone(), value.to_string());
            }
        }
        data.push(Datum::new(term, display));
    }

    let mut fields = Vec::with_capacity(field_cols.len());
    let mut field_metadata_map = FieldMetadataMap::new();
    for (_, header) in &field_cols {
        let column = cells.remove(header.as_str()).unwrap_or_default();
        let field_type = guess_field_type(column.values().map(String::as_str));
        let metadata: Metadata = column
            .into_iter()
            .map(|(term, raw)| (term, vec![parse_cell(&raw, field_type)]))
            .collect();
        fields.push(Field::new(header.as_str(), header.as_str(), field_type));
        field_metadata_map.insert(header.to_string(), Arc::new(metadata));
    }

    Ok(FilterServiceAttrs {
        columns: fields.clone(),
        fields,
        data,
        field_metadata_map,
    })
}

fn header_position(headers: &[String], name: &str) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        FilterError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("CSV missing '{name}' column"),
        ))
    })
}

fn guess_field_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> FieldType {
    if cells.clone().next().is_none() {
        return FieldType::String;
    }
    if cells.clone().all(|c| parse_finite(c).is_some()) {
        FieldType::Number
    } else if cells.into_iter().all(is_iso_date) {
        FieldType::Date
    } else {
        FieldType::String
    }
}

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
pub fn is_iso_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let digits = |p: &str, n: usize| p.len() == n && p.bytes().all(|b| b.is_ascii_digit());
    match parts.as_slice() {
        [y] => digits(y, 4),
        [y, m] => digits(y, 4) && digits(m, 2),
        [y, m, d] => digits(y, 4) && digits(m, 2) && digits(d, 2),
        _ => false,
    }
}

/// `NaN` and infinities are not numbers here; they could never be matched
/// by a filter.
fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_cell(raw: &str, field_type: FieldType) -> FieldValue {
    match field_type {
        FieldType::Number => parse_finite(raw)
            .map(FieldValue::Number)
            .unwrap_or_else(|| FieldValue::String(raw.to_string())),
        FieldType::String | FieldType::Date => FieldValue::String(raw.to_string()),
    }
}
