use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::filter::{datum_passes, Filter};
use super::model::{Datum, Distribution, DistributionEntry, FieldMetadataMap, FieldValue};

// ---------------------------------------------------------------------------
// Client-side distribution computation
// ---------------------------------------------------------------------------

/// Histogram of `field_term` over `data`.
///
/// `count` is the number of data carrying each value; `filtered_count` only
/// counts data passing every filter in `filters` except the one on
/// `field_term`. A datum with several values is counted once per distinct
/// value; one with none counts toward the unknown (null) bucket. Entries come
/// back in display order, unknown last.
pub fn compute_distribution(
    field_term: &str,
    data: &[Datum],
    filters: &[Arc<Filter>],
    metadata: &FieldMetadataMap,
) -> Distribution {
    let other_filters: Vec<&Arc<Filter>> =
        filters.iter().filter(|f| f.field() != field_term).collect();
    let field_metadata = metadata.get(field_term);

    let mut buckets: BTreeMap<FieldValue, (usize, usize)> = BTreeMap::new();
    for datum in data {
        let values: BTreeSet<FieldValue> = match field_metadata.and_then(|m| m.get(&datum.term)) {
            Some(values) if !values.is_empty() => values.iter().cloned().collect(),
            _ => BTreeSet::from([FieldValue::Null]),
        };
        let passes = datum_passes(datum, other_filters.iter().copied(), metadata);
        for value in values {
            let bucket = buckets.entry(value).or_default();
            bucket.0 += 1;
            if passes {
                bucket.1 += 1;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(value, (count, filtered_count))| DistributionEntry {
            value,
            count,
            filtered_count,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Display ordering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    #[default]
    Value,
    Count,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// How a membership field's values are listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSort {
    pub column: SortColumn,
    pub direction: SortDirection,
    pub group_by_selected: bool,
}

/// Order a distribution for display.
///
/// Unknown always sorts last, whatever the direction. With
/// `group_by_selected`, values included in `filter` come before the rest.
pub fn sort_distribution(
    distribution: &[DistributionEntry],
    sort: MemberSort,
    filter: Option<&Filter>,
) -> Distribution {
    let selected = |entry: &DistributionEntry| match filter {
        Some(Filter::Member { values, .. }) => values.contains(&entry.value),
        _ => false,
    };

    let mut sorted = distribution.to_vec();
    sorted.sort_by(|a, b| {
        let unknown = a.value.is_null().cmp(&b.value.is_null());
        let group = if sort.group_by_selected {
            selected(b).cmp(&selected(a))
        } else {
            std::cmp::Ordering::Equal
        };
        let primary = match sort.column {
            SortColumn::Value => a.value.cmp(&b.value),
            SortColumn::Count => a.count.cmp(&b.count).then_with(|| a.value.cmp(&b.value)),
        };
        let primary = match sort.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        unknown.then(group).then(primary)
    });
    sorted
}

// ---------------------------------------------------------------------------
// Range overview
// ---------------------------------------------------------------------------

/// Overview of a number or date distribution: the known values' extent and
/// how many data have no value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub min: Option<FieldValue>,
    pub max: Option<FieldValue>,
    /// Count-weighted mean; only defined for numeric values.
    pub average: Option<f64>,
    pub known_count: usize,
    pub unknown_count: usize,
}

pub fn summarize(distribution: &[DistributionEntry]) -> DistributionSummary {
    let (known, unknown): (Vec<_>, Vec<_>) =
        distribution.iter().partition(|entry| !entry.value.is_null());

    let known_count: usize = known.iter().map(|e| e.count).sum();
    let unknown_count: usize = unknown.iter().map(|e| e.count).sum();
    let min = known.iter().map(|e| &e.value).min().cloned();
    let max = known.iter().map(|e| &e.value).max().cloned();

    let weighted: Option<f64> = known
        .iter()
        .map(|e| e.value.as_f64().map(|v| v * e.count as f64))
        .sum();
    let average = match weighted {
        Some(sum) if known_count > 0 => Some(sum / known_count as f64),
        _ => None,
    };

    DistributionSummary {
        min,
        max,
        average,
        known_count,
        unknown_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Metadata;

    fn entry(value: FieldValue, count: usize, filtered_count: usize) -> DistributionEntry {
        DistributionEntry {
            value,
            count,
            filtered_count,
        }
    }

    fn metadata() -> FieldMetadataMap {
        let organism: Metadata = [
            ("g1", vec![FieldValue::from("pf")]),
            ("g2", vec![FieldValue::from("pv")]),
            ("g3", vec![]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let length: Metadata = [
            ("g1", vec![FieldValue::from(100.0)]),
            ("g2", vec![FieldValue::from(2500.0)]),
            ("g3", vec![FieldValue::from(900.0)]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        FieldMetadataMap::from([
            ("organism".to_string(), Arc::new(organism)),
            ("length".to_string(), Arc::new(length)),
        ])
    }

    fn data() -> Vec<Datum> {
        vec![
            Datum::new("g1", "G1"),
            Datum::new("g2", "G2"),
            Datum::new("g3", "G3"),
        ]
    }

    #[test]
    fn filtered_count_ignores_the_fields_own_filter() {
        let filters = vec![
            Arc::new(Filter::member("organism", vec!["pf".into()])),
            Arc::new(Filter::range("length", None, Some(1000.0.into()))),
        ];
        let dist = compute_distribution("organism", &data(), &filters, &metadata());
        assert_eq!(
            dist,
            vec![
                entry("pf".into(), 1, 1),
                entry("pv".into(), 1, 0),
                entry(FieldValue::Null, 1, 1),
            ]
        );
    }

    #[test]
    fn count_is_never_below_filtered_count() {
        let filters = vec![Arc::new(Filter::member("organism", vec!["pv".into()]))];
        for entry in compute_distribution("length", &data(), &filters, &metadata()) {
            assert!(entry.count >= entry.filtered_count);
        }
    }

    #[test]
    fn unknown_stays_last_in_every_ordering() {
        let dist = vec![
            entry(FieldValue::Null, 9, 9),
            entry("b".into(), 1, 1),
            entry("a".into(), 5, 0),
        ];
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            for column in [SortColumn::Value, SortColumn::Count] {
                let sort = MemberSort {
                    column,
                    direction,
                    group_by_selected: false,
                };
                let sorted = sort_distribution(&dist, sort, None);
                assert_eq!(sorted.last().map(|e| &e.value), Some(&FieldValue::Null));
            }
        }
    }

    #[test]
    fn sort_by_count_descending() {
        let dist = vec![entry("a".into(), 1, 1), entry("b".into(), 5, 5), entry("c".into(), 3, 3)];
        let sort = MemberSort {
            column: SortColumn::Count,
            direction: SortDirection::Desc,
            group_by_selected: false,
        };
        let values: Vec<_> = sort_distribution(&dist, sort, None)
            .into_iter()
            .map(|e| e.value.to_string())
            .collect();
        assert_eq!(values, vec!["b", "c", "a"]);
    }

    #[test]
    fn selected_values_group_first() {
        let dist = vec![entry("a".into(), 1, 1), entry("b".into(), 1, 1), entry("c".into(), 1, 1)];
        let filter = Filter::member("f", vec!["c".into()]);
        let sort = MemberSort {
            group_by_selected: true,
            ..MemberSort::default()
        };
        let values: Vec<_> = sort_distribution(&dist, sort, Some(&filter))
            .into_iter()
            .map(|e| e.value.to_string())
            .collect();
        assert_eq!(values, vec!["c", "a", "b"]);
    }

    #[test]
    fn summary_of_numeric_distribution() {
        let dist = vec![
            entry(10.0.into(), 1, 1),
            entry(20.0.into(), 3, 1),
            entry(FieldValue::Null, 2, 2),
        ];
        let summary = summarize(&dist);
        assert_eq!(summary.min, Some(10.0.into()));
        assert_eq!(summary.max, Some(20.0.into()));
        assert_eq!(summary.average, Some(17.5));
        assert_eq!(summary.known_count, 4);
        assert_eq!(summary.unknown_count, 2);
    }

    #[test]
    fn summary_of_dates_has_no_average() {
        let dist = vec![entry("2001".into(), 1, 1), entry("1999-03".into(), 1, 1)];
        let summary = summarize(&dist);
        assert_eq!(summary.min, Some("1999-03".into()));
        assert_eq!(summary.average, None);
    }
}
