use std::collections::HashSet;

use daysmith_rs::data::{CLOSE, HIGH, LOW, OPEN, PriceFrame, VOLUME};
use daysmith_rs::{
    Diagnostic, Diagnostics, FeatureMatrix, FillPolicy, PipelineConfig, PipelineError,
    PipelineResult,
};
use serde::Serialize;
use tracing::info;

use crate::engineer::FeatureEngineer;
use crate::features::{RETURNS, candidate_features, lookback_registry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassBalance {
    pub down: usize,
    pub up: usize,
}

impl ClassBalance {
    pub fn from_labels(labels: &[u8]) -> Self {
        let up = labels.iter().filter(|label| **label == 1).count();
        Self {
            down: labels.len() - up,
            up,
        }
    }

    pub fn total(&self) -> usize {
        self.down + self.up
    }
}

/// Model-ready output of [`build_dataset`].
#[derive(Clone, Debug)]
pub struct Dataset {
    /// One row per cleaned row, one column per entry of `feature_names`.
    pub features: FeatureMatrix,
    /// Next-day direction: 1 when the following row's return is positive.
    pub labels: Vec<u8>,
    /// Price columns, the target and every resolved feature, fully filled.
    pub cleaned: PriceFrame,
    pub feature_names: Vec<String>,
    pub diagnostics: Diagnostics,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn class_balance(&self) -> ClassBalance {
        ClassBalance::from_labels(&self.labels)
    }

    /// Row whose label has no following return to look at. It is always the
    /// final row and is labelled 0.
    pub fn unlabeled_row(&self) -> Option<usize> {
        self.labels.len().checked_sub(1)
    }

    /// Features and labels without the unlabeled final row.
    pub fn trainable(&self) -> (FeatureMatrix, &[u8]) {
        let rows = self.unlabeled_row().unwrap_or(0);
        (self.features.head_rows(rows), &self.labels[..rows])
    }
}

/// Add lookback features and the label to an indicator frame, then assemble
/// the cleaned table and the feature matrix.
pub fn build_dataset(frame: PriceFrame, config: &PipelineConfig) -> PipelineResult<Dataset> {
    DatasetBuilder::new(config).build(frame)
}

pub struct DatasetBuilder<'a> {
    config: &'a PipelineConfig,
    policy: FillPolicy,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            policy: FillPolicy::standard(),
        }
    }

    pub fn build(&self, frame: PriceFrame) -> PipelineResult<Dataset> {
        self.config.validate()?;
        frame.require(CLOSE)?;
        frame.require(RETURNS)?;

        let target = self.config.target_column.as_str();
        let registry = lookback_registry(&self.config.lookback_days, target);
        let (frame, mut diagnostics) = FeatureEngineer::new(frame)
            .derive(&registry)?
            .into_parts()?;

        let feature_names = self.resolve_features(&frame, &mut diagnostics);

        let mut essentials: Vec<String> = [CLOSE, OPEN, HIGH, LOW, VOLUME, target]
            .iter()
            .map(|name| name.to_string())
            .collect();
        essentials.extend(feature_names.iter().cloned());
        let cleaned = self.policy.apply_frame(frame.select(essentials.as_slice())?)?;

        let rows = cleaned.height();
        if rows < self.config.min_samples {
            return Err(PipelineError::InsufficientData { rows });
        }

        let columns = feature_names
            .iter()
            .map(|name| Ok((name.clone(), cleaned.float_column(name)?)))
            .collect::<PipelineResult<Vec<_>>>()?;
        let features = FeatureMatrix::from_columns(columns)?;
        let labels: Vec<u8> = cleaned
            .float_column(target)?
            .iter()
            .map(|value| u8::from(*value > 0.0))
            .collect();

        let balance = ClassBalance::from_labels(&labels);
        info!(samples = rows, features = feature_names.len(), "Prepared dataset");
        info!(down = balance.down, up = balance.up, "Target distribution");

        Ok(Dataset {
            features,
            labels,
            cleaned,
            feature_names,
            diagnostics,
        })
    }

    /// Candidates present as columns, in candidate order and without repeats.
    fn resolve_features(&self, frame: &PriceFrame, diagnostics: &mut Diagnostics) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut available = Vec::new();
        let mut missing = Vec::new();
        for name in candidate_features(&self.config.lookback_days) {
            if !seen.insert(name.clone()) {
                continue;
            }
            if frame.has_column(&name) {
                available.push(name);
            } else {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            diagnostics.record(Diagnostic::MissingFeatures { names: missing });
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn class_balance_counts_both_labels() {
        let balance = ClassBalance::from_labels(&[1, 0, 1, 1]);
        assert_eq!(balance, ClassBalance { down: 1, up: 3 });
        assert_eq!(balance.total(), 4);
    }

    #[test]
    fn trainable_view_excludes_final_row() {
        let features =
            FeatureMatrix::from_columns(vec![("x".to_string(), vec![1.0, 2.0, 3.0])]).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let index = (0..3).map(|i| start + chrono::Duration::days(i)).collect();
        let cleaned =
            PriceFrame::from_columns(index, vec![("x".to_string(), vec![1.0, 2.0, 3.0])]).unwrap();
        let dataset = Dataset {
            features,
            labels: vec![1, 0, 0],
            cleaned,
            feature_names: vec!["x".to_string()],
            diagnostics: Diagnostics::new(),
        };
        assert_eq!(dataset.unlabeled_row(), Some(2));
        let (x, y) = dataset.trainable();
        assert_eq!(x.n_rows(), 2);
        assert_eq!(y, &[1u8, 0][..]);
    }
}
