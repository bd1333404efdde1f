#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use wdk_filter::data::model::{Distribution, FieldMetadataMap, Metadata};
use wdk_filter::{
    ClientSideBackend, Datum, Field, FieldType, FieldValue, Filter, FilterBackend, FilterError,
    FilterServiceAttrs, Result,
};

pub fn organism() -> Field {
    Field::new("organism", "Organism", FieldType::String).with_parent("genome")
}

pub fn length() -> Field {
    Field::new("length", "Gene length", FieldType::Number).with_range(true)
}

pub fn fields() -> Vec<Field> {
    vec![
        Field::new("genome", "Genome", FieldType::String),
        organism(),
        length(),
    ]
}

pub fn data() -> Vec<Datum> {
    (1..=5)
        .map(|i| Datum::new(format!("g{i}"), format!("Gene {i}")))
        .collect()
}

pub fn metadata() -> FieldMetadataMap {
    let organism: Metadata = [("g1", "pf"), ("g2", "pf"), ("g3", "pv"), ("g4", "tg"), ("g5", "pv")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), vec![FieldValue::from(v)]))
        .collect();
    let length: Metadata = [("g1", 100.0), ("g2", 2500.0), ("g3", 900.0), ("g5", 4000.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), vec![FieldValue::from(v)]))
        .collect();
    FieldMetadataMap::from([
        ("organism".to_string(), Arc::new(organism)),
        ("length".to_string(), Arc::new(length)),
    ])
}

pub fn attrs() -> FilterServiceAttrs {
    FilterServiceAttrs {
        fields: fields(),
        data: data(),
        columns: vec![organism()],
        field_metadata_map: metadata(),
    }
}

pub fn terms(data: &[Datum]) -> Vec<&str> {
    data.iter().map(|d| d.term.as_str()).collect()
}

pub fn member(field: &str, values: &[&str]) -> Arc<Filter> {
    Arc::new(Filter::member(
        field,
        values.iter().map(|v| FieldValue::from(*v)).collect(),
    ))
}

pub fn range(field: &str, min: Option<f64>, max: Option<f64>) -> Arc<Filter> {
    Arc::new(Filter::range(
        field,
        min.map(FieldValue::from),
        max.map(FieldValue::from),
    ))
}

/// Client-side backend with per-call delays, a call log and a failure switch.
pub struct ScriptedBackend {
    inner: ClientSideBackend,
    distribution_delays: Mutex<HashMap<String, Duration>>,
    filtered_delays: Mutex<VecDeque<Duration>>,
    metadata_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl ScriptedBackend {
    pub fn new(attrs: &FilterServiceAttrs) -> Self {
        ScriptedBackend {
            inner: ClientSideBackend::new(
                Arc::new(attrs.data.clone()),
                attrs.field_metadata_map.clone(),
            ),
            distribution_delays: Mutex::new(HashMap::new()),
            filtered_delays: Mutex::new(VecDeque::new()),
            metadata_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn delay_distribution(&self, term: &str, delay: Duration) {
        self.distribution_delays
            .lock()
            .unwrap()
            .insert(term.to_string(), delay);
    }

    /// Delays for the next `filtered_data` calls, in call order.
    pub fn queue_filtered_delays(&self, delays: &[Duration]) {
        self.filtered_delays.lock().unwrap().extend(delays.iter().copied());
    }

    pub fn delay_metadata(&self, delay: Duration) {
        *self.metadata_delay.lock().unwrap() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(FilterError::fetch("backend", format!("{call} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl FilterBackend for ScriptedBackend {
    async fn field_distribution(
        &self,
        field: &Field,
        filters: &[Arc<Filter>],
    ) -> Result<Distribution> {
        self.record(format!("distribution:{}", field.term))?;
        let delay = self
            .distribution_delays
            .lock()
            .unwrap()
            .get(&field.term)
            .copied()
            .unwrap_or_default();
        tokio::time::sleep(delay).await;
        self.inner.field_distribution(field, filters).await
    }

    async fn filtered_data(&self, filters: &[Arc<Filter>]) -> Result<Vec<Datum>> {
        self.record(format!("filtered:{}", filters.len()))?;
        let delay = self
            .filtered_delays
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        tokio::time::sleep(delay).await;
        self.inner.filtered_data(filters).await
    }

    async fn field_metadata(&self, field: &Field) -> Result<Metadata> {
        self.record(format!("metadata:{}", field.term))?;
        let delay = *self.metadata_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.inner.field_metadata(field).await
    }
}
