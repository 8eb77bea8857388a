use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use daysmith_rs::PipelineConfig;

const DEFAULT_SYNTHETIC_DAYS: i64 = 365;

#[derive(Parser, Debug)]
#[command(
    name = "daysmith",
    about = "Daily OHLCV feature engineering and next-day direction labels"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build model-ready datasets from OHLCV CSV files or synthetic prices
    #[command(name = "prepare")]
    Prepare(PrepareArgs),
}

#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// One or more OHLCV CSV files; each is prepared independently
    #[arg(
        long = "csv",
        value_name = "FILE",
        num_args = 1..,
        value_hint = clap::ValueHint::FilePath,
        required_unless_present = "synthetic",
        conflicts_with = "synthetic"
    )]
    pub csv_paths: Vec<PathBuf>,

    /// Generate a seeded synthetic price series instead of reading CSVs
    #[arg(long, default_value_t = false)]
    pub synthetic: bool,

    /// Symbol used to name synthetic outputs
    #[arg(long, default_value = "SYNTH")]
    pub symbol: String,

    /// First calendar day of the synthetic series (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// Last calendar day of the synthetic series (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Output directory for prepared datasets, summaries and logs
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Lookback windows in days, comma separated (default 3,5,10,20)
    #[arg(long = "lookback", value_delimiter = ',')]
    pub lookback: Option<Vec<usize>>,

    /// Minimum rows the cleaned dataset must keep (default 50)
    #[arg(long = "min-samples")]
    pub min_samples: Option<usize>,

    /// Number of features reported by the ANOVA selector (default 20)
    #[arg(long = "top-k")]
    pub top_k: Option<usize>,

    /// Inclusive start date filter (YYYY-MM-DD)
    #[arg(long = "date-start")]
    pub date_start: Option<String>,

    /// Inclusive end date filter (YYYY-MM-DD)
    #[arg(long = "date-end")]
    pub date_end: Option<String>,

    /// Keep only the trailing N years (365-day years ending today)
    #[arg(long = "years")]
    pub years: Option<u32>,

    /// TOML file with pipeline settings; command-line flags take precedence.
    /// Dates are written as quoted strings, e.g. include_date_start = "2023-01-01".
    #[arg(long = "config", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Acknowledge that a newly prepared dataset differs from an existing
    /// <symbol>_prepared.csv in the output directory; overwrite and continue.
    #[arg(long = "ack-new-df", default_value_t = false)]
    pub ack_new_df: bool,

    /// Number of worker threads (omit to use all logical cores)
    #[arg(long = "workers", alias = "n-jobs")]
    pub workers: Option<usize>,

    /// Disable writing daysmith.log into the output directory. When set,
    /// logs are only emitted to stdout.
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}

/// Where a job reads its raw prices from.
#[derive(Clone, Debug, PartialEq)]
pub enum DataSource {
    Csv(PathBuf),
    Synthetic { start: NaiveDate, end: NaiveDate },
}

/// One independent pipeline run, keyed by the symbol its outputs are named after.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    pub symbol: String,
    pub source: DataSource,
}

impl PrepareArgs {
    /// Pipeline settings: TOML file (if any) overridden by explicit flags.
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(lookback) = &self.lookback {
            config.lookback_days = lookback.clone();
        }
        if let Some(min_samples) = self.min_samples {
            config.min_samples = min_samples;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(start) = parse_optional_date(self.date_start.as_deref())? {
            config.include_date_start = Some(start);
        }
        if let Some(end) = parse_optional_date(self.date_end.as_deref())? {
            config.include_date_end = Some(end);
        }
        if self.years.is_some() {
            config.years = self.years;
        }
        config
            .validate()
            .with_context(|| "Invalid pipeline configuration")?;
        Ok(config)
    }

    pub fn jobs(&self) -> Result<Vec<Job>> {
        if self.synthetic {
            let end = parse_optional_date(self.end.as_deref())?
                .unwrap_or_else(|| Local::now().date_naive());
            let start = parse_optional_date(self.start.as_deref())?
                .unwrap_or(end - Duration::days(DEFAULT_SYNTHETIC_DAYS));
            return Ok(vec![Job {
                symbol: self.symbol.clone(),
                source: DataSource::Synthetic { start, end },
            }]);
        }

        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(self.csv_paths.len());
        for path in &self.csv_paths {
            let symbol = symbol_for_path(path)?;
            if !seen.insert(symbol.clone()) {
                return Err(anyhow!(
                    "Two inputs map to the symbol '{symbol}'; outputs would overwrite each other"
                ));
            }
            jobs.push(Job {
                symbol,
                source: DataSource::Csv(path.clone()),
            });
        }
        Ok(jobs)
    }
}

fn load_config_file(path: &Path) -> Result<PipelineConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Unable to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Unable to parse config {}", path.display()))
}

fn symbol_for_path(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| anyhow!("Cannot derive a symbol from {}", path.display()))
}

pub fn normalize_workers(value: Option<usize>) -> usize {
    value.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value {
        Some(raw) => {
            let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format for {raw}. Expected YYYY-MM-DD"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
