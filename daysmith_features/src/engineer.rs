use std::collections::HashSet;

use daysmith_rs::data::{PriceFrame, REQUIRED_FIELDS};
use daysmith_rs::{
    ColumnKind, DegenerateKind, Diagnostics, FeatureRegistry, FeatureSpec, FillPolicy,
    PipelineResult, Rule,
};
use tracing::{debug, info};

use crate::features::indicator_registry;

const RSI_LOSS_EPSILON: f64 = 0.0001;
const NEUTRAL_RSI: f64 = 50.0;
const NEUTRAL_RANK: f64 = 0.5;

/// Derive every indicator column from the OHLCV fields of a sanitized price
/// frame and apply the standard fill policy once at the end. Other source
/// columns are not carried over.
pub fn compute_indicators(frame: PriceFrame) -> PipelineResult<(PriceFrame, Diagnostics)> {
    let frame = frame.select(&REQUIRED_FIELDS)?;
    let registry = indicator_registry();
    let rows = frame.height();
    let (frame, diagnostics) = FeatureEngineer::new(frame)
        .derive(&registry)?
        .finish(&FillPolicy::standard())?;
    info!(
        rows,
        features = registry.visible_names().len(),
        degenerate_events = diagnostics.len(),
        "Computed indicator columns"
    );
    Ok((frame, diagnostics))
}

/// Evaluates feature registries against a [`PriceFrame`], one column per
/// spec, in dependency order.
pub struct FeatureEngineer {
    frame: PriceFrame,
    hidden: Vec<String>,
    diagnostics: Diagnostics,
}

impl FeatureEngineer {
    pub fn new(frame: PriceFrame) -> Self {
        Self {
            frame,
            hidden: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Compute every spec of `registry` and append it to the frame.
    pub fn derive(self, registry: &FeatureRegistry) -> PipelineResult<Self> {
        let FeatureEngineer {
            mut frame,
            mut hidden,
            mut diagnostics,
        } = self;
        let base = frame.column_names();
        for spec in registry.resolve(base.as_slice())? {
            let values = evaluate(&frame, spec, &mut diagnostics)?;
            frame = match spec.rule.kind() {
                ColumnKind::Float => frame.with_float_column(&spec.name, values)?,
                ColumnKind::Flag => {
                    let flags = values.iter().map(|v| i32::from(*v != 0.0)).collect();
                    frame.with_flag_column(&spec.name, flags)?
                }
            };
            if !spec.visible {
                hidden.push(spec.name.clone());
            }
            debug!(feature = %spec.name, category = ?spec.category, "Derived feature column");
        }
        Ok(Self {
            frame,
            hidden,
            diagnostics,
        })
    }

    /// Drop hidden intermediates and hand back the frame unfilled.
    pub fn into_parts(self) -> PipelineResult<(PriceFrame, Diagnostics)> {
        let hidden: HashSet<&str> = self.hidden.iter().map(String::as_str).collect();
        let keep: Vec<String> = self
            .frame
            .column_names()
            .into_iter()
            .filter(|name| !hidden.contains(name.as_str()))
            .collect();
        let frame = self.frame.select(keep.as_slice())?;
        Ok((frame, self.diagnostics))
    }

    /// [`FeatureEngineer::into_parts`] followed by `policy`.
    pub fn finish(self, policy: &FillPolicy) -> PipelineResult<(PriceFrame, Diagnostics)> {
        let (frame, diagnostics) = self.into_parts()?;
        Ok((policy.apply_frame(frame)?, diagnostics))
    }
}

/// Values of `spec` as floats; flag rules yield 0.0/1.0 and are stored as
/// flags according to [`Rule::kind`].
fn evaluate(
    frame: &PriceFrame,
    spec: &FeatureSpec,
    diagnostics: &mut Diagnostics,
) -> PipelineResult<Vec<f64>> {
    let values = match &spec.rule {
        Rule::PctChange { source, periods } => pct_change(&frame.float_column(source)?, *periods),
        Rule::LogReturn { source } => log_returns(&frame.float_column(source)?),
        Rule::RollingMean { source, window } => {
            rolling_mean(&frame.float_column(source)?, *window)
        }
        Rule::RollingMeanOrSource { source, window } => {
            let values = frame.float_column(source)?;
            let mean = rolling_mean(&values, *window);
            mean.iter()
                .zip(values.iter())
                .map(|(m, v)| if m.is_nan() { *v } else { *m })
                .collect()
        }
        Rule::Ema { source, span } => ema_span(&frame.float_column(source)?, *span),
        Rule::RollingStd { source, window } => rolling_std(&frame.float_column(source)?, *window),
        Rule::RangeRank { source, window } => {
            let (rank, flat) = range_rank(&frame.float_column(source)?, *window);
            diagnostics.record_degenerate(&spec.name, DegenerateKind::ZeroRangeRank, flat);
            rank
        }
        Rule::Rsi { source, window } => {
            let outcome = rsi(&frame.float_column(source)?, *window);
            let name = spec.name.as_str();
            diagnostics.record_degenerate(name, DegenerateKind::ZeroLossRsi, outcome.zero_loss);
            diagnostics.record_degenerate(name, DegenerateKind::FlatRsi, outcome.flat);
            outcome.values
        }
        Rule::Ratio {
            numerator,
            denominator,
            neutral,
        } => {
            let (values, substituted) = ratio(
                &frame.float_column(numerator)?,
                &frame.float_column(denominator)?,
                *neutral,
            );
            diagnostics.record_degenerate(&spec.name, DegenerateKind::NeutralRatio, substituted);
            values
        }
        Rule::Difference {
            left,
            right,
            neutral,
        } => {
            let left = frame.float_column(left)?;
            let right = frame.float_column(right)?;
            left.iter()
                .zip(right.iter())
                .map(|(l, r)| {
                    let diff = l - r;
                    if diff.is_finite() { diff } else { *neutral }
                })
                .collect()
        }
        Rule::Above { source, level } => frame
            .float_column(source)?
            .iter()
            .map(|v| if *v > *level { 1.0 } else { 0.0 })
            .collect(),
        Rule::Below { source, level } => frame
            .float_column(source)?
            .iter()
            .map(|v| if *v < *level { 1.0 } else { 0.0 })
            .collect(),
        Rule::NextPositive { source } => next_positive(&frame.float_column(source)?)
            .into_iter()
            .map(f64::from)
            .collect(),
    };
    Ok(values)
}

/// Forward-pad NaNs with the last defined value.
fn pad_forward(values: &[f64]) -> Vec<f64> {
    let mut last = f64::NAN;
    values
        .iter()
        .map(|v| {
            if !v.is_nan() {
                last = *v;
            }
            last
        })
        .collect()
}

fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    let padded = pad_forward(values);
    padded
        .iter()
        .enumerate()
        .map(|(i, &current)| {
            if periods == 0 {
                0.0
            } else if i < periods {
                f64::NAN
            } else {
                current / padded[i - periods] - 1.0
            }
        })
        .collect()
}

fn log_returns(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, &current)| {
            if i == 0 {
                f64::NAN
            } else {
                (current / values[i - 1]).ln()
            }
        })
        .collect()
}

/// Apply `f` to every full window of finite values; other positions are NaN.
fn rolling_apply(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if window == 0 || i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| !v.is_finite()) {
                f64::NAN
            } else {
                f(slice)
            }
        })
        .collect()
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |slice| {
        slice.iter().sum::<f64>() / slice.len() as f64
    })
}

fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; values.len()];
    }
    rolling_apply(values, window, |slice| {
        let mean = slice.iter().sum::<f64>() / slice.len() as f64;
        let sum_sq = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        (sum_sq / (slice.len() - 1) as f64).sqrt()
    })
}

fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |slice| {
        slice.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |slice| {
        slice.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Exponential moving average with `alpha = 2 / (span + 1)` and adjusted
/// weights, defined from the first observation. Missing values decay the
/// accumulated weight but repeat the previous average.
fn ema_span(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut result = Vec::with_capacity(values.len());
    let mut weighted = f64::NAN;
    let mut old_weight = 1.0;
    for &value in values {
        let observed = !value.is_nan();
        if weighted.is_nan() {
            if observed {
                weighted = value;
            }
        } else {
            old_weight *= decay;
            if observed {
                if weighted != value {
                    weighted = (old_weight * weighted + value) / (old_weight + 1.0);
                }
                old_weight += 1.0;
            }
        }
        result.push(weighted);
    }
    result
}

/// Rolling position of each value in its min/max range. Returns the ranks and
/// the number of rows with a zero range.
fn range_rank(values: &[f64], window: usize) -> (Vec<f64>, usize) {
    let lows = rolling_min(values, window);
    let highs = rolling_max(values, window);
    let mut flat = 0;
    let ranks = values
        .iter()
        .zip(lows.iter().zip(highs.iter()))
        .map(|(value, (low, high))| {
            let span = high - low;
            if span == 0.0 {
                flat += 1;
                return NEUTRAL_RANK;
            }
            let rank = (value - low) / span;
            if rank.is_finite() { rank } else { NEUTRAL_RANK }
        })
        .collect();
    (ranks, flat)
}

struct RsiOutcome {
    values: Vec<f64>,
    zero_loss: usize,
    flat: usize,
}

fn rsi(values: &[f64], window: usize) -> RsiOutcome {
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let delta = if i == 0 {
            f64::NAN
        } else {
            values[i] - values[i - 1]
        };
        gains.push(if delta > 0.0 { delta } else { 0.0 });
        losses.push(if delta < 0.0 { -delta } else { 0.0 });
    }
    let avg_gain = rolling_mean(&gains, window);
    let avg_loss = rolling_mean(&losses, window);

    let mut zero_loss = 0;
    let mut flat = 0;
    let values = avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(&gain, &loss)| {
            if gain.is_nan() || loss.is_nan() {
                return NEUTRAL_RSI;
            }
            let loss = if loss == 0.0 {
                if gain == 0.0 {
                    flat += 1;
                    return NEUTRAL_RSI;
                }
                zero_loss += 1;
                RSI_LOSS_EPSILON
            } else {
                loss
            };
            let rsi = 100.0 - 100.0 / (1.0 + gain / loss);
            if rsi.is_finite() { rsi } else { NEUTRAL_RSI }
        })
        .collect();
    RsiOutcome {
        values,
        zero_loss,
        flat,
    }
}

fn ratio(numerator: &[f64], denominator: &[f64], neutral: f64) -> (Vec<f64>, usize) {
    let mut substituted = 0;
    let values = numerator
        .iter()
        .zip(denominator.iter())
        .map(|(n, d)| {
            let value = n / d;
            if *d == 0.0 || !value.is_finite() {
                substituted += 1;
                neutral
            } else {
                value
            }
        })
        .collect();
    (values, substituted)
}

fn next_positive(values: &[f64]) -> Vec<i32> {
    (0..values.len())
        .map(|i| {
            values
                .get(i + 1)
                .map_or(0, |next| i32::from(*next > 0.0))
        })
        .collect()
}
