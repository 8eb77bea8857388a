use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use daysmith_rs::sanitize::canonical_name;
use daysmith_rs::{RawColumn, RawIndex, RawTable};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, LogNormal, Normal};
use tracing::{debug, info, warn};

const SYNTHETIC_SEED: u64 = 42;
const START_PRICE: f64 = 100.0;
const FALLBACK_DAYS: i64 = 365;

/// Read an OHLCV CSV into a raw table. The `Date` column (any case) is the
/// row index; without one, the first column is used. Every other column is
/// read as numbers, with unparseable cells treated as missing.
pub fn load_csv(path: &Path) -> Result<RawTable> {
    let df = CsvReader::from_path(path)
        .with_context(|| format!("Unable to open {}", path.display()))?
        .has_header(true)
        .infer_schema(Some(1024))
        .finish()
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let index_name = names
        .iter()
        .find(|name| name.eq_ignore_ascii_case("date"))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| anyhow!("{} has no columns", path.display()))?;

    let labels = string_values(df.column(&index_name)?)?;
    let mut columns = Vec::with_capacity(names.len().saturating_sub(1));
    // A repeated index header comes back as `Date_duplicated_0`; it is not a price column.
    for name in names
        .iter()
        .filter(|name| canonical_name(name) != index_name.as_str())
    {
        columns.push(RawColumn::new(name.clone(), numeric_values(df.column(name)?)?));
    }
    debug!(
        path = %path.display(),
        rows = labels.len(),
        index = %index_name,
        "Loaded CSV"
    );
    Ok(RawTable::new(RawIndex::Labels(labels), columns))
}

fn string_values(series: &Series) -> Result<Vec<String>> {
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect())
}

fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    if series.dtype() == &DataType::String {
        return Ok(series
            .str()?
            .into_iter()
            .map(|value| value.and_then(|raw| raw.trim().parse::<f64>().ok()))
            .collect());
    }
    if !series.dtype().is_numeric() {
        warn!(
            column = %series.name(),
            dtype = ?series.dtype(),
            "Non-numeric column read as missing"
        );
        return Ok(vec![None; series.len()]);
    }
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Weekdays from `start` to `end`, both inclusive.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Seeded geometric random walk with an OHLC envelope and log-normal volume.
/// An empty range falls back to the year ending at `end`.
pub fn synthetic_prices(symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<RawTable> {
    let mut dates = business_days(start, end);
    if dates.is_empty() {
        warn!(%symbol, %start, %end, "Empty synthetic range; using the trailing year instead");
        dates = business_days(end - Duration::days(FALLBACK_DAYS), end);
    }
    let n = dates.len();
    let mut rng = StdRng::seed_from_u64(SYNTHETIC_SEED);

    let returns = Normal::new(0.0005, 0.02)?;
    let open_noise = Normal::new(0.0, 0.005)?;
    let wick = Normal::<f64>::new(0.01, 0.01)?;
    let volume_dist = LogNormal::new(14.0, 1.0)?;

    let mut close = Vec::with_capacity(n);
    let mut level = 0.0;
    for _ in 0..n {
        level += returns.sample(&mut rng);
        close.push(START_PRICE * f64::exp(level));
    }
    let mut open: Vec<f64> = close
        .iter()
        .map(|p| p * (1.0 + open_noise.sample(&mut rng)))
        .collect();
    let mut high: Vec<f64> = close
        .iter()
        .map(|p| p * (1.0 + wick.sample(&mut rng).abs()))
        .collect();
    let mut low: Vec<f64> = close
        .iter()
        .map(|p| p * (1.0 - wick.sample(&mut rng).abs()))
        .collect();
    let volume: Vec<f64> = (0..n).map(|_| volume_dist.sample(&mut rng)).collect();

    for i in 0..n {
        let bars = [open[i], high[i], low[i], close[i]];
        let top = bars.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let bottom = bars.iter().copied().fold(f64::INFINITY, f64::min);
        high[i] = top;
        low[i] = bottom;
        open[i] = open[i].clamp(bottom, top);
    }

    info!(%symbol, rows = n, first = %dates[0], last = %dates[n - 1], "Generated synthetic prices");
    Ok(RawTable::new(
        RawIndex::Dates(dates),
        vec![
            RawColumn::from_values("Open", &open),
            RawColumn::from_values("High", &high),
            RawColumn::from_values("Low", &low),
            RawColumn::from_values("Close", &close),
            RawColumn::from_values("Volume", &volume),
        ],
    ))
}
