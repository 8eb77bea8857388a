use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::data::series_to_f64;
use crate::error::{PipelineError, PipelineResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureScore {
    pub name: String,
    /// One-way ANOVA F statistic; NaN when the test is undefined.
    pub score: f64,
}

/// Score every numeric column except `target` against the target classes,
/// in column order. Missing values count as 0 on both sides; `df` is not
/// modified.
pub fn score_features(df: &DataFrame, target: &str) -> PipelineResult<Vec<FeatureScore>> {
    let target_series = df
        .column(target)
        .map_err(|_| PipelineError::MissingRequiredColumn(target.to_string()))?;
    let classes = class_indices(&series_to_f64(target_series)?);

    let mut scores = Vec::new();
    for series in df.get_columns() {
        if series.name() == target || !series.dtype().is_numeric() {
            continue;
        }
        let values: Vec<f64> = series_to_f64(series)?
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v })
            .collect();
        scores.push(FeatureScore {
            name: series.name().to_string(),
            score: anova_f(&values, &classes),
        });
    }
    Ok(scores)
}

/// [`score_features`] sorted by descending score. Ties keep column order and
/// undefined scores sort last.
pub fn rank_features(df: &DataFrame, target: &str) -> PipelineResult<Vec<FeatureScore>> {
    let mut scores = score_features(df, target)?;
    scores.sort_by(|a, b| rank_key(b.score).total_cmp(&rank_key(a.score)));
    Ok(scores)
}

/// Names of the `k` highest-scoring features; fewer when fewer candidates
/// exist.
pub fn select_best_features(
    df: &DataFrame,
    target: &str,
    k: usize,
) -> PipelineResult<Vec<String>> {
    let ranked = rank_features(df, target)?;
    let candidates = ranked.len();
    let selected: Vec<String> = ranked.into_iter().take(k).map(|s| s.name).collect();
    debug!(
        candidates,
        requested = k,
        selected = selected.len(),
        "Ranked features by ANOVA F-score"
    );
    Ok(selected)
}

fn rank_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// Row positions grouped by label, ordered by first appearance.
fn class_indices(labels: &[f64]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<u64, usize> = HashMap::new();
    let mut classes: Vec<Vec<usize>> = Vec::new();
    for (row, label) in labels.iter().enumerate() {
        let label = if label.is_nan() { 0.0 } else { *label };
        // +0.0 and -0.0 are the same class.
        let key = (label + 0.0).to_bits();
        let slot = *slots.entry(key).or_insert_with(|| {
            classes.push(Vec::new());
            classes.len() - 1
        });
        classes[slot].push(row);
    }
    classes
}

fn anova_f(values: &[f64], classes: &[Vec<usize>]) -> f64 {
    let n = values.len();
    let k = classes.len();
    if k < 2 || n <= k {
        return f64::NAN;
    }
    let grand_mean = values.iter().sum::<f64>() / n as f64;
    let mut between = 0.0;
    let mut within = 0.0;
    for rows in classes {
        let mean = rows.iter().map(|&r| values[r]).sum::<f64>() / rows.len() as f64;
        between += rows.len() as f64 * (mean - grand_mean).powi(2);
        within += rows.iter().map(|&r| (values[r] - mean).powi(2)).sum::<f64>();
    }
    if within == 0.0 {
        return if between > 0.0 { f64::INFINITY } else { f64::NAN };
    }
    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    (between / df_between) / (within / df_within)
}
