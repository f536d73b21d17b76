use anyhow::{Context as _, Result};
use app_experiment_histogram::{ExperimentConfig, HistogramJob, Measurement};
use clap::Parser;
use common::{init_logger, run, CsvContext, Job, RunSummary};
use std::{
    convert::Infallible,
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    str::FromStr,
};
use tracing::info;

/// Run the experiment histogram job over local JSON-lines files.
#[derive(Parser, Debug)]
struct Cli {
    /// TOML file with experiment_id, measurements and summary_slots
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    experiment_id: Option<String>,
    /// Replaces the configured measurement list when given
    #[arg(short = 'm', long = "measurement", value_name = "NAME:BUCKETS")]
    measurements: Vec<Measurement>,
    /// CSV destination, `-` for stdout
    #[arg(short, long, default_value = "mr-experiment-histogram-seq")]
    output: Output,
    #[arg(required = true)]
    input_files: Vec<PathBuf>,
}

impl Cli {
    fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_toml_file(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(id) = &self.experiment_id {
            config.experiment_id = id.clone();
        }
        if !self.measurements.is_empty() {
            config.measurements = self.measurements.clone();
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Output {
    Stdout,
    File(PathBuf),
}

impl FromStr for Output {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "-" => Output::Stdout,
            path => Output::File(PathBuf::from(path)),
        })
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => f.write_str("-"),
            Output::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Output {
    fn writer(&self) -> Result<Box<dyn Write>> {
        match self {
            Output::Stdout => Ok(Box::new(io::stdout().lock())),
            Output::File(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                Ok(Box::new(BufWriter::new(file)))
            }
        }
    }
}

/// One record per non-blank line, keyed `<file>:<line>`.
async fn load_records(files: &[PathBuf]) -> Result<Vec<(String, String)>> {
    let mut records = Vec::new();
    for file in files {
        let contents = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            records.push((format!("{}:{}", file.display(), i + 1), line.to_string()));
        }
    }
    Ok(records)
}

fn write_output<W: Write>(
    job: &HistogramJob,
    records: Vec<(String, String)>,
    out: W,
) -> Result<RunSummary> {
    let mut cx = CsvContext::new(out);
    let summary = run(job, records, &mut cx)?;
    cx.finish()?.flush()?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    let job = HistogramJob::new(cli.experiment_config()?)?;
    info!(
        job = job.name(),
        experiment = %job.config().experiment_id,
        measurements = job.config().measurements.len(),
        "starting"
    );

    let records = load_records(&cli.input_files).await?;
    let summary = write_output(&job, records, cli.output.writer()?)?;
    info!(output = %cli.output, rows = summary.keys, "done");

    Ok(())
}
