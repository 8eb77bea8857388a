use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::REQUIRED_FIELDS;
use crate::error::{PipelineError, PipelineResult};

fn default_lookback_days() -> Vec<usize> {
    vec![3, 5, 10, 20]
}

const fn default_min_samples() -> usize {
    50
}

const fn default_top_k() -> usize {
    20
}

fn default_target_column() -> String {
    "Target".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Window sizes for the `Returns_{d}d`, `Volatility_{d}d` and `MA_{d}d`
    /// features.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: Vec<usize>,
    /// Minimum number of rows the cleaned table must keep.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Number of features kept by the selector when ranking is requested.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// Inclusive start-date filter applied before indicators are computed.
    #[serde(default)]
    pub include_date_start: Option<NaiveDate>,
    /// Inclusive end-date filter applied before indicators are computed.
    #[serde(default)]
    pub include_date_end: Option<NaiveDate>,
    /// Relative window of `years * 365` days ending today. Explicit
    /// start/end dates take precedence over the bound it implies.
    #[serde(default)]
    pub years: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            min_samples: default_min_samples(),
            top_k: default_top_k(),
            target_column: default_target_column(),
            include_date_start: None,
            include_date_end: None,
            years: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.lookback_days.is_empty() {
            return Err(invalid("lookback_days must not be empty"));
        }
        let mut seen = HashSet::new();
        for &days in &self.lookback_days {
            if days < 2 {
                return Err(invalid(format!(
                    "lookback window {days} is too short (minimum 2)"
                )));
            }
            if !seen.insert(days) {
                return Err(invalid(format!("lookback window {days} is listed twice")));
            }
        }
        if self.min_samples == 0 {
            return Err(invalid("min_samples must be at least 1"));
        }
        let target = self.target_column.trim();
        if target.is_empty() {
            return Err(invalid("target_column must not be empty"));
        }
        if REQUIRED_FIELDS.contains(&target) {
            return Err(invalid(format!(
                "target_column '{target}' collides with a price field"
            )));
        }
        if let (Some(start), Some(end)) = (self.include_date_start, self.include_date_end) {
            if start > end {
                return Err(invalid(format!(
                    "include_date_start {start} is after include_date_end {end}"
                )));
            }
        }
        Ok(())
    }

    /// Inclusive date bounds to apply, resolving `years` against `today`.
    pub fn date_window(&self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let (mut start, mut end) = (self.include_date_start, self.include_date_end);
        if let Some(years) = self.years {
            start = start.or(Some(today - Duration::days(365 * i64::from(years))));
            end = end.or(Some(today));
        }
        (start, end)
    }
}

fn invalid(reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.lookback_days, vec![3, 5, 10, 20]);
        assert_eq!(config.min_samples, 50);
        assert_eq!(config.top_k, 20);
        assert_eq!(config.target_column, "Target");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn repeated_lookback_is_rejected() {
        let config = PipelineConfig {
            lookback_days: vec![5, 10, 5],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("twice")
        ));
    }

    #[test]
    fn target_may_not_shadow_price_fields() {
        let config = PipelineConfig {
            target_column: "Close".into(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn years_fill_only_missing_bounds() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let explicit_end = NaiveDate::from_ymd_opt(2024, 5, 1);
        let config = PipelineConfig {
            years: Some(1),
            include_date_end: explicit_end,
            ..PipelineConfig::default()
        };
        let (start, end) = config.date_window(today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 6, 2));
        assert_eq!(end, explicit_end);
    }

    #[test]
    fn no_window_without_bounds() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(PipelineConfig::default().date_window(today), (None, None));
    }
}
