use std::path::Path;

use anyhow::{Context, Result};
use daysmith_features::prepare_dataset;
use daysmith_rs::PipelineConfig;
use rayon::prelude::*;
use tracing::{error, info};

use crate::cli::{DataSource, Job, PrepareArgs, normalize_workers};
use crate::output::{
    PreparedStatus, Summary, ensure_output_dir, summary_path, top_features, write_prepared,
    write_summary,
};
use crate::source::{load_csv, synthetic_prices};

#[derive(Debug)]
pub struct JobReport {
    pub symbol: String,
    pub rows: usize,
    pub status: PreparedStatus,
}

/// Prepare every requested input on a dedicated pool. Jobs are independent;
/// all of them run even when one fails, and the first failure is returned.
pub fn run_prepare(args: &PrepareArgs) -> Result<Vec<JobReport>> {
    let config = args.to_config()?;
    let jobs = args.jobs()?;
    ensure_output_dir(&args.output_dir)?;

    let workers = normalize_workers(args.workers).min(jobs.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("failed to build rayon thread pool")?;
    info!(jobs = jobs.len(), workers, "Preparing datasets");

    let results: Vec<Result<JobReport>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| run_job(job, &config, &args.output_dir, args.ack_new_df))
            .collect()
    });

    let mut reports = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(symbol = %job.symbol, error = %format!("{err:#}"), "Job failed");
                failures.push(err);
            }
        }
    }
    let failed = failures.len();
    match failures.into_iter().next() {
        Some(first) if failed == 1 => Err(first),
        Some(first) => Err(first.context(format!("{failed} of {} jobs failed", jobs.len()))),
        None => Ok(reports),
    }
}

fn run_job(
    job: &Job,
    config: &PipelineConfig,
    output_dir: &Path,
    ack_new_df: bool,
) -> Result<JobReport> {
    let raw = match &job.source {
        DataSource::Csv(path) => load_csv(path)?,
        DataSource::Synthetic { start, end } => synthetic_prices(&job.symbol, *start, *end)?,
    };
    let dataset = prepare_dataset(raw, config)
        .with_context(|| format!("Failed to prepare dataset for {}", job.symbol))?;

    let prepared = write_prepared(&dataset, output_dir, &job.symbol, ack_new_df)?;
    let selected = top_features(&dataset, config)?;
    let index = dataset.cleaned.index();
    let summary = Summary {
        symbol: &job.symbol,
        rows: dataset.n_samples(),
        first_date: index.first().map(|d| d.to_string()),
        last_date: index.last().map(|d| d.to_string()),
        feature_names: &dataset.feature_names,
        selected_features: selected,
        class_balance: dataset.class_balance(),
        prepared_csv: prepared.path.display().to_string(),
        prepared_sha256: &prepared.sha256,
        config,
        diagnostics: &dataset.diagnostics,
    };
    let path = summary_path(output_dir, &job.symbol);
    write_summary(&path, &summary)?;

    if let Some(best) = summary.selected_features.first() {
        info!(symbol = %job.symbol, feature = %best.name, score = best.score, "Top feature");
    }
    info!(
        symbol = %job.symbol,
        rows = summary.rows,
        features = dataset.feature_names.len(),
        diagnostics = dataset.diagnostics.len(),
        summary = %path.display(),
        "Job complete"
    );
    Ok(JobReport {
        symbol: job.symbol.clone(),
        rows: summary.rows,
        status: prepared.status,
    })
}
