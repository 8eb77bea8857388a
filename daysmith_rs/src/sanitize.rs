use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::data::{PriceFrame, REQUIRED_FIELDS, RawIndex, RawTable};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{PipelineError, PipelineResult};

/// Suffix polars' CSV reader appends to repeated header names.
const CSV_DUPLICATE_MARKER: &str = "_duplicated_";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Clone, Debug)]
pub struct Sanitized {
    pub frame: PriceFrame,
    pub diagnostics: Diagnostics,
}

/// Turn an ingested table into a [`PriceFrame`]: one column per distinct
/// name (first occurrence wins), a date-typed ascending index, and all
/// required OHLCV fields present.
pub fn sanitize(raw: RawTable) -> PipelineResult<Sanitized> {
    let mut diagnostics = Diagnostics::new();
    let rows = raw.index.len();

    let mut seen = HashSet::new();
    let mut dropped = Vec::new();
    let mut columns = Vec::with_capacity(raw.columns.len());
    for column in raw.columns {
        let name = canonical_name(&column.name).to_string();
        if column.values.len() != rows {
            return Err(PipelineError::LengthMismatch {
                column: column.name,
                expected: rows,
                found: column.values.len(),
            });
        }
        if !seen.insert(name.clone()) {
            dropped.push(name);
            continue;
        }
        let values = column
            .values
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect::<Vec<_>>();
        columns.push((name, values));
    }
    if !dropped.is_empty() {
        diagnostics.record(Diagnostic::DuplicateColumnsDropped { names: dropped });
    }

    for field in REQUIRED_FIELDS {
        if !seen.contains(field) {
            return Err(PipelineError::MissingRequiredColumn(field.to_string()));
        }
    }

    let index = match raw.index {
        RawIndex::Dates(dates) => dates,
        RawIndex::Labels(labels) => {
            let dates = labels
                .iter()
                .map(|label| {
                    parse_index_label(label).ok_or_else(|| {
                        PipelineError::InvalidIndex(format!("unparseable date label '{label}'"))
                    })
                })
                .collect::<PipelineResult<Vec<_>>>()?;
            diagnostics.record(Diagnostic::IndexConverted { rows: dates.len() });
            dates
        }
    };

    let frame = PriceFrame::from_columns(index, columns)?;
    debug!(
        rows = frame.height(),
        columns = frame.column_names().len(),
        "Sanitized price table"
    );
    Ok(Sanitized { frame, diagnostics })
}

/// Map a reader-renamed duplicate (`Close_duplicated_0`) back to its base name.
pub fn canonical_name(name: &str) -> &str {
    match name.rfind(CSV_DUPLICATE_MARKER) {
        Some(pos) if pos > 0 => {
            let suffix = &name[pos + CSV_DUPLICATE_MARKER.len()..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                &name[..pos]
            } else {
                name
            }
        }
        _ => name,
    }
}

/// Parse a textual index label as a calendar date. Timestamps are truncated
/// to their date.
pub fn parse_index_label(label: &str) -> Option<NaiveDate> {
    let trimmed = label.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawColumn;

    fn ohlcv_columns(close: &[f64]) -> Vec<RawColumn> {
        vec![
            RawColumn::from_values("Open", close),
            RawColumn::from_values("High", close),
            RawColumn::from_values("Low", close),
            RawColumn::from_values("Close", close),
            RawColumn::from_values("Volume", &vec![1_000.0; close.len()]),
        ]
    }

    #[test]
    fn canonical_name_strips_reader_suffix_only() {
        assert_eq!(canonical_name("Close_duplicated_0"), "Close");
        assert_eq!(canonical_name("Close_duplicated_12"), "Close");
        assert_eq!(canonical_name("Close_duplicated_"), "Close_duplicated_");
        assert_eq!(canonical_name("_duplicated_1"), "_duplicated_1");
        assert_eq!(canonical_name("Volume"), "Volume");
    }

    #[test]
    fn parse_index_label_accepts_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_index_label("2024-03-05"), expected);
        assert_eq!(parse_index_label("2024/03/05"), expected);
        assert_eq!(parse_index_label("2024-03-05 16:00:00"), expected);
        assert_eq!(parse_index_label("2024-03-05T00:00:00Z"), expected);
        assert_eq!(parse_index_label("yesterday"), None);
    }

    #[test]
    fn duplicate_close_keeps_first_occurrence() -> anyhow::Result<()> {
        let mut columns = ohlcv_columns(&[1.0, 2.0, 3.0]);
        columns.push(RawColumn::from_values("Close_duplicated_0", &[7.0, 8.0, 9.0]));
        let raw = RawTable::new(
            RawIndex::Labels(vec![
                "2024-01-01".into(),
                "2024-01-02".into(),
                "2024-01-03".into(),
            ]),
            columns,
        );
        let sanitized = sanitize(raw)?;
        assert_eq!(sanitized.frame.float_column("Close")?, vec![1.0, 2.0, 3.0]);
        assert_eq!(sanitized.frame.column_names().len(), 5);
        assert!(sanitized.diagnostics.any(|d| matches!(
            d,
            Diagnostic::DuplicateColumnsDropped { names } if names == &["Close".to_string()]
        )));
        assert!(
            sanitized
                .diagnostics
                .any(|d| matches!(d, Diagnostic::IndexConverted { rows: 3 }))
        );
        Ok(())
    }

    #[test]
    fn missing_volume_is_a_structural_error() {
        let mut columns = ohlcv_columns(&[1.0, 2.0]);
        columns.retain(|col| col.name != "Volume");
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let raw = RawTable::new(
            RawIndex::Dates(vec![start, start.succ_opt().unwrap()]),
            columns,
        );
        let err = sanitize(raw).expect_err("volume is required");
        assert!(matches!(err, PipelineError::MissingRequiredColumn(name) if name == "Volume"));
    }

    #[test]
    fn unparseable_label_is_rejected() {
        let raw = RawTable::new(
            RawIndex::Labels(vec!["2024-01-01".into(), "not a date".into()]),
            ohlcv_columns(&[1.0, 2.0]),
        );
        assert!(matches!(sanitize(raw), Err(PipelineError::InvalidIndex(_))));
    }

    #[test]
    fn short_column_is_a_length_mismatch() {
        let mut columns = ohlcv_columns(&[1.0, 2.0]);
        columns.push(RawColumn::from_values("Extra", &[1.0]));
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let raw = RawTable::new(
            RawIndex::Dates(vec![start, start.succ_opt().unwrap()]),
            columns,
        );
        assert!(matches!(
            sanitize(raw),
            Err(PipelineError::LengthMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn missing_values_become_nan() -> anyhow::Result<()> {
        let mut columns = ohlcv_columns(&[1.0, 2.0]);
        columns[3] = RawColumn::new("Close", vec![Some(1.0), None]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let raw = RawTable::new(
            RawIndex::Dates(vec![start, start.succ_opt().unwrap()]),
            columns,
        );
        let close = sanitize(raw)?.frame.float_column("Close")?;
        assert_eq!(close[0], 1.0);
        assert!(close[1].is_nan());
        Ok(())
    }
}
