//! Per-branch bucket sums of selected telemetry histograms for one
//! experiment.
//!
//! `map` turns one JSON telemetry submission into `(branch, measurement,
//! bucket) -> count` pairs; `reduce` sums each key and writes one CSV row
//! `branch,measurement,bucket,sum`.

mod config;
mod count;
mod error;

pub use config::{ExperimentConfig, Measurement, DEFAULT_EXPERIMENT_ID, DEFAULT_SUMMARY_SLOTS};
pub use count::Count;
pub use error::{ConfigError, HistogramError};

use common::{Context, Job, KeyValue};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey {
    pub branch: Option<String>,
    pub measurement: String,
    pub bucket: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramRow {
    pub branch: Option<String>,
    pub measurement: String,
    pub bucket: usize,
    pub sum: Count,
}

#[derive(Debug, Clone, Default)]
pub struct HistogramJob {
    config: ExperimentConfig,
}

impl HistogramJob {
    pub fn new(config: ExperimentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Sum `values` under `key`. Sums of partial sums give the same row.
    pub fn aggregate(key: &CompositeKey, values: impl IntoIterator<Item = Count>) -> HistogramRow {
        HistogramRow {
            branch: key.branch.clone(),
            measurement: key.measurement.clone(),
            bucket: key.bucket,
            sum: values.into_iter().sum(),
        }
    }

    fn buckets(&self, m: &Measurement, value: &Value) -> Result<Vec<Count>, HistogramError> {
        let Some(slots) = value.as_array() else {
            return Err(HistogramError::NotAnArray {
                measurement: m.name.clone(),
                value: value.clone(),
            });
        };

        let expected = self.config.expected_len(m);
        if slots.len() != expected {
            return Err(HistogramError::Length {
                measurement: m.name.clone(),
                expected,
                actual: slots.len(),
                value: value.clone(),
            });
        }

        let mut counts = Vec::with_capacity(m.buckets);
        for (bucket, slot) in slots[..m.buckets].iter().enumerate() {
            let Some(count) = Count::from_json(slot) else {
                return Err(HistogramError::NotNumeric {
                    measurement: m.name.clone(),
                    bucket,
                    value: slot.clone(),
                });
            };
            counts.push(count);
        }
        Ok(counts)
    }
}

/// `null` and absent read as empty; any other non-object is malformed.
fn object<'a>(
    key: &str,
    field: &'static str,
    value: Option<&'a Value>,
) -> Result<Option<&'a Map<String, Value>>, HistogramError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(HistogramError::NotAnObject {
            key: key.to_string(),
            field,
            value: other.clone(),
        }),
    }
}

/// Branch labels as they appear in the output: strings verbatim, booleans as
/// `True`/`False`, other values as compact JSON.
fn branch_name(branch: &Value) -> Option<String> {
    match branch {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        other => Some(other.to_string()),
    }
}

impl Job for HistogramJob {
    type Key = CompositeKey;
    type Value = Count;
    type Error = HistogramError;

    fn name(&self) -> &str {
        "experiment-histogram"
    }

    fn map(
        &self,
        key: &str,
        record: &str,
    ) -> Result<Vec<KeyValue<CompositeKey, Count>>, HistogramError> {
        let experiment_id = self.config.experiment_id.as_str();
        if !record.contains(experiment_id) {
            trace!(key, "experiment id not in record");
            return Ok(Vec::new());
        }

        // Repeated object keys are valid JSON; the last one wins.
        let parse_error = |source| HistogramError::Parse {
            key: key.to_string(),
            source,
        };
        let payload: Value = serde_json::from_str(record).map_err(parse_error)?;
        let root = object(key, "record", Some(&payload))?;

        let info = object(key, "info", root.and_then(|r| r.get("info")))?;
        let active = info
            .and_then(|i| i.get("activeExperiment"))
            .and_then(Value::as_str);
        if active != Some(experiment_id) {
            trace!(key, "record not enrolled in experiment");
            return Ok(Vec::new());
        }
        let branch = info
            .and_then(|i| i.get("activeExperimentBranch"))
            .and_then(branch_name);

        let histograms = root.and_then(|r| r.get("histograms"));
        let Some(histograms) = object(key, "histograms", histograms)? else {
            return Ok(Vec::new());
        };

        let mut kva = Vec::new();
        for m in &self.config.measurements {
            let Some(value) = histograms.get(&m.name) else {
                continue;
            };
            let buckets = self.buckets(m, value)?;
            debug!(
                key,
                measurement = %m.name,
                branch = ?branch,
                "emitting {} buckets",
                buckets.len()
            );
            for (bucket, count) in buckets.into_iter().enumerate() {
                kva.push(KeyValue {
                    key: CompositeKey {
                        branch: branch.clone(),
                        measurement: m.name.clone(),
                        bucket,
                    },
                    value: count,
                });
            }
        }
        Ok(kva)
    }

    fn reduce<C: Context>(
        &self,
        key: &CompositeKey,
        values: Vec<Count>,
        cx: &mut C,
    ) -> Result<(), HistogramError> {
        cx.write_csv(&Self::aggregate(key, values))?;
        Ok(())
    }
}
