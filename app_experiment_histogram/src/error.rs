use common::ContextError;
use serde_json::Value;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Fatal job errors. None of these are recovered inside the job.
#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("record {key} is not valid json: {source}")]
    Parse {
        key: String,
        source: serde_json::Error,
    },
    #[error("unexpected length for key {measurement}: expected {expected}, got {actual}: {value}")]
    Length {
        measurement: String,
        expected: usize,
        actual: usize,
        value: Value,
    },
    #[error("record {key}: {field} is not an object: {value}")]
    NotAnObject {
        key: String,
        field: &'static str,
        value: Value,
    },
    #[error("histogram {measurement} is not an array: {value}")]
    NotAnArray { measurement: String, value: Value },
    #[error("histogram {measurement} bucket {bucket} is not a number: {value}")]
    NotNumeric {
        measurement: String,
        bucket: usize,
        value: Value,
    },
    #[error(transparent)]
    Sink(#[from] ContextError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid config toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
