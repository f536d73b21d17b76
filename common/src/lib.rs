use itertools::Itertools;
use serde::Serialize;
use std::{fmt::Debug, io};
use thiserror::Error;
use time::{macros::format_description, UtcOffset};
use tracing::{debug, info};
use tracing_subscriber::{fmt::time::OffsetTime, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to write csv row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv output: {0}")]
    Io(#[from] io::Error),
}

/// Output capability handed to `Job::reduce`.
pub trait Context {
    fn write_csv<R: Serialize>(&mut self, row: &R) -> Result<(), ContextError>;
}

/// A map/reduce job: `map` runs once per input record, `reduce` once per
/// distinct key with every value emitted under it.
pub trait Job {
    type Key: Ord + Clone + Debug;
    type Value;
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &str;

    fn map(
        &self,
        key: &str,
        record: &str,
    ) -> Result<Vec<KeyValue<Self::Key, Self::Value>>, Self::Error>;

    fn reduce<C: Context>(
        &self,
        key: &Self::Key,
        values: Vec<Self::Value>,
        cx: &mut C,
    ) -> Result<(), Self::Error>;
}

/// Headerless CSV sink over any writer.
pub struct CsvContext<W: io::Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: io::Write> CsvContext<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(inner),
            rows: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush buffered rows and give back the inner writer.
    pub fn finish(self) -> Result<W, ContextError> {
        self.writer
            .into_inner()
            .map_err(|e| ContextError::Io(e.into_error()))
    }
}

impl<W: io::Write> Context for CsvContext<W> {
    fn write_csv<R: Serialize>(&mut self, row: &R) -> Result<(), ContextError> {
        self.writer.serialize(row)?;
        self.rows += 1;
        Ok(())
    }
}

/// Keeps every written row as one CSV line, without the line terminator.
#[derive(Debug, Default)]
pub struct VecContext {
    pub rows: Vec<String>,
}

impl Context for VecContext {
    fn write_csv<R: Serialize>(&mut self, row: &R) -> Result<(), ContextError> {
        let mut cx = CsvContext::new(Vec::new());
        cx.write_csv(row)?;
        let bytes = cx.finish()?;
        let line = String::from_utf8_lossy(&bytes);
        self.rows.push(line.trim_end_matches(['\r', '\n']).to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    pub pairs: usize,
    pub keys: usize,
}

/// Run `job` over `(key, record)` inputs in memory: map everything, sort the
/// intermediate pairs by key, then reduce each group of equal keys in order.
///
/// The sort is stable, so values reach `reduce` in emission order. The first
/// map or reduce error aborts the run.
pub fn run<J, I, C>(job: &J, records: I, cx: &mut C) -> Result<RunSummary, J::Error>
where
    J: Job,
    I: IntoIterator<Item = (String, String)>,
    C: Context,
{
    let mut summary = RunSummary::default();
    let mut intermediate = Vec::new();
    for (key, record) in records {
        let kva = job.map(&key, &record)?;
        debug!(job = job.name(), key = %key, pairs = kva.len(), "mapped record");
        summary.records += 1;
        intermediate.extend(kva);
    }
    summary.pairs = intermediate.len();

    intermediate.sort_by(|a, b| a.key.cmp(&b.key));

    let groups = intermediate.into_iter().group_by(|kv| kv.key.clone());
    for (key, kvs) in &groups {
        job.reduce(&key, kvs.map(|kv| kv.value).collect_vec(), cx)?;
        summary.keys += 1;
    }

    info!(
        job = job.name(),
        records = summary.records,
        pairs = summary.pairs,
        keys = summary.keys,
        "run finished"
    );
    Ok(summary)
}

/// Install the stderr fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_logger() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]"),
    );
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer(io::stderr)
        .try_init();
}
