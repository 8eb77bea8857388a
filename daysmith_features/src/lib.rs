mod dataset;
mod engineer;
pub mod features;

use chrono::{Local, NaiveDate};
use daysmith_rs::{PipelineConfig, PipelineResult, RawTable, sanitize};
use tracing::info;

pub use dataset::{ClassBalance, Dataset, DatasetBuilder, build_dataset};
pub use engineer::{FeatureEngineer, compute_indicators};

/// Run sanitize, date filtering, indicators and dataset assembly on a raw
/// table, resolving a relative `years` window against today's date.
pub fn prepare_dataset(raw: RawTable, config: &PipelineConfig) -> PipelineResult<Dataset> {
    prepare_dataset_as_of(raw, config, Local::now().date_naive())
}

pub fn prepare_dataset_as_of(
    raw: RawTable,
    config: &PipelineConfig,
    today: NaiveDate,
) -> PipelineResult<Dataset> {
    config.validate()?;
    let sanitized = sanitize(raw)?;
    let mut diagnostics = sanitized.diagnostics;

    let (start, end) = config.date_window(today);
    let frame = sanitized.frame.filter_by_date_range(start, end)?;
    if start.is_some() || end.is_some() {
        info!(
            start = ?start,
            end = ?end,
            rows = frame.height(),
            "Applied date window"
        );
    }

    let (frame, indicator_diagnostics) = compute_indicators(frame)?;
    diagnostics.absorb(indicator_diagnostics);

    let mut dataset = build_dataset(frame, config)?;
    diagnostics.absorb(dataset.diagnostics);
    dataset.diagnostics = diagnostics;
    Ok(dataset)
}
