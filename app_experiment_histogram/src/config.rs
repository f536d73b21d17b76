use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path, str::FromStr};

pub const DEFAULT_EXPERIMENT_ID: &str =
    "fx-dom.ipc.plugins.unloadTimeoutSecs-beta32@experiments.mozilla.org";

/// bucketN, sum, log_sum, log_sum_squares, sum_squares_lo, sum_squares_hi
pub const DEFAULT_SUMMARY_SLOTS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Measurement {
    pub name: String,
    pub buckets: usize,
}

impl Measurement {
    pub fn new(name: impl Into<String>, buckets: usize) -> Self {
        Self {
            name: name.into(),
            buckets,
        }
    }
}

/// `NAME:BUCKETS`, as taken on the command line.
impl FromStr for Measurement {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, buckets)) = s.rsplit_once(':') else {
            let msg = format!("expected NAME:BUCKETS, got {s:?}");
            return Err(ConfigError::Invalid(msg));
        };
        let buckets = match buckets.trim().parse() {
            Ok(buckets) => buckets,
            Err(e) => {
                let msg = format!("bad bucket count in {s:?}: {e}");
                return Err(ConfigError::Invalid(msg));
            }
        };
        Ok(Self::new(name.trim(), buckets))
    }
}

/// Immutable job configuration. Fields missing from a TOML file keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub experiment_id: String,
    pub measurements: Vec<Measurement>,
    pub summary_slots: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
            measurements: vec![
                Measurement::new("PLUGIN_STARTUP_MS", 20),
                Measurement::new("NEWTAB_PAGE_SITE_CLICKED", 20),
            ],
            summary_slots: DEFAULT_SUMMARY_SLOTS,
        }
    }
}

impl ExperimentConfig {
    pub fn new(experiment_id: impl Into<String>, measurements: Vec<Measurement>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            measurements,
            summary_slots: DEFAULT_SUMMARY_SLOTS,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(source) => {
                let path = path.to_path_buf();
                return Err(ConfigError::Io { path, source });
            }
        };
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiment_id.is_empty() {
            return Err(ConfigError::Invalid("experiment_id is empty".into()));
        }
        if self.measurements.is_empty() {
            return Err(ConfigError::Invalid("no measurements configured".into()));
        }
        let mut seen = HashSet::new();
        for m in &self.measurements {
            if m.name.is_empty() {
                return Err(ConfigError::Invalid("measurement name is empty".into()));
            }
            if m.buckets == 0 {
                let msg = format!("measurement {} has no buckets", m.name);
                return Err(ConfigError::Invalid(msg));
            }
            if !seen.insert(m.name.as_str()) {
                let msg = format!("measurement {} configured twice", m.name);
                return Err(ConfigError::Invalid(msg));
            }
        }
        Ok(())
    }

    /// Length a histogram array must have for `m`.
    pub fn expected_len(&self, m: &Measurement) -> usize {
        m.buckets + self.summary_slots
    }
}
