use chrono::NaiveDate;
use polars::prelude::*;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{PipelineError, PipelineResult};

pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";
pub const DATE: &str = "Date";

/// Fields every price table must carry, in canonical order.
pub const REQUIRED_FIELDS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Row index of a table as delivered by a data source.
#[derive(Clone, Debug, PartialEq)]
pub enum RawIndex {
    Dates(Vec<NaiveDate>),
    Labels(Vec<String>),
}

impl RawIndex {
    pub fn len(&self) -> usize {
        match self {
            RawIndex::Dates(dates) => dates.len(),
            RawIndex::Labels(labels) => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn from_values(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, values.iter().copied().map(Some).collect())
    }
}

/// Table at the ingestion boundary. Unlike [`PriceFrame`], column names are
/// not guaranteed unique here.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    pub index: RawIndex,
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(index: RawIndex, columns: Vec<RawColumn>) -> Self {
        Self { index, columns }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|col| col.name.as_str()).collect()
    }

    /// Single numeric sequence for `name`, missing values as NaN.
    ///
    /// When the name is duplicated the first occurrence wins and a
    /// [`Diagnostic::ColumnCollision`] is recorded.
    pub fn field(&self, name: &str, diagnostics: &mut Diagnostics) -> Option<Vec<f64>> {
        let mut matches = self.columns.iter().filter(|col| col.name == name);
        let first = matches.next()?;
        let extra = matches.count();
        if extra > 0 {
            diagnostics.record(Diagnostic::ColumnCollision {
                name: name.to_string(),
                occurrences: extra + 1,
            });
        }
        Some(
            first
                .values
                .iter()
                .map(|value| value.unwrap_or(f64::NAN))
                .collect(),
        )
    }
}

/// Daily price table keyed by unique column names over an ascending date index.
///
/// Every transformation returns a new value; a frame is never mutated once a
/// stage has handed it on.
#[derive(Clone, Debug)]
pub struct PriceFrame {
    index: Vec<NaiveDate>,
    frame: DataFrame,
}

impl PriceFrame {
    pub fn new(index: Vec<NaiveDate>, frame: DataFrame) -> PipelineResult<Self> {
        if frame.width() > 0 && frame.height() != index.len() {
            let first = frame.get_column_names()[0].to_string();
            return Err(PipelineError::LengthMismatch {
                column: first,
                expected: index.len(),
                found: frame.height(),
            });
        }
        ensure_ascending(&index)?;
        Ok(Self { index, frame })
    }

    /// Build a frame from float columns. Duplicate names are rejected by polars.
    pub fn from_columns(
        index: Vec<NaiveDate>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> PipelineResult<Self> {
        let expected = index.len();
        let mut series = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if values.len() != expected {
                return Err(PipelineError::LengthMismatch {
                    column: name,
                    expected,
                    found: values.len(),
                });
            }
            series.push(Series::new(&name, values));
        }
        let frame = DataFrame::new(series)?;
        Self::new(index, frame)
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn data_frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn require(&self, name: &str) -> PipelineResult<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(PipelineError::MissingRequiredColumn(name.to_string()))
        }
    }

    /// Column as floats with nulls mapped to NaN. Integer columns are cast.
    pub fn float_column(&self, name: &str) -> PipelineResult<Vec<f64>> {
        let series = self
            .frame
            .column(name)
            .map_err(|_| PipelineError::MissingRequiredColumn(name.to_string()))?;
        series_to_f64(series)
    }

    /// Return a new frame with `series` added, replacing a same-named column.
    pub fn with_series(mut self, series: Series) -> PipelineResult<Self> {
        if series.len() != self.height() {
            return Err(PipelineError::LengthMismatch {
                column: series.name().to_string(),
                expected: self.height(),
                found: series.len(),
            });
        }
        self.frame.with_column(series)?;
        Ok(self)
    }

    pub fn with_float_column(self, name: &str, values: Vec<f64>) -> PipelineResult<Self> {
        self.with_series(Series::new(name, values))
    }

    pub fn with_flag_column(self, name: &str, values: Vec<i32>) -> PipelineResult<Self> {
        self.with_series(Series::new(name, values))
    }

    /// Return a new frame containing only `keep`, in that order.
    pub fn select<S: AsRef<str>>(&self, keep: &[S]) -> PipelineResult<Self> {
        for name in keep {
            self.require(name.as_ref())?;
        }
        let names: Vec<&str> = keep.iter().map(|s| s.as_ref()).collect();
        let frame = self.frame.select(&names)?;
        Ok(Self {
            index: self.index.clone(),
            frame,
        })
    }

    /// Keep rows whose date lies within the optional inclusive bounds.
    pub fn filter_by_date_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PipelineResult<Self> {
        if start.is_none() && end.is_none() {
            return Ok(self.clone());
        }
        let keep: Vec<bool> = self
            .index
            .iter()
            .map(|date| start.is_none_or(|s| *date >= s) && end.is_none_or(|e| *date <= e))
            .collect();
        let mask = BooleanChunked::from_slice("date_filter", &keep);
        let frame = self.frame.filter(&mask)?;
        let index = self
            .index
            .iter()
            .zip(keep.iter())
            .filter(|(_, flag)| **flag)
            .map(|(date, _)| *date)
            .collect();
        Ok(Self { index, frame })
    }

    /// Frame with the date index materialised as a leading `Date` column.
    pub fn to_data_frame_with_dates(&self) -> PipelineResult<DataFrame> {
        let dates: Vec<String> = self
            .index
            .iter()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .collect();
        let mut columns = Vec::with_capacity(self.frame.width() + 1);
        columns.push(Series::new(DATE, dates));
        columns.extend(self.frame.get_columns().iter().cloned());
        Ok(DataFrame::new(columns)?)
    }
}

pub fn series_to_f64(series: &Series) -> PipelineResult<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

fn ensure_ascending(index: &[NaiveDate]) -> PipelineResult<()> {
    for pair in index.windows(2) {
        if pair[1] <= pair[0] {
            let reason = if pair[1] == pair[0] {
                format!("duplicate date {}", pair[1])
            } else {
                format!("date {} follows {}", pair[1], pair[0])
            };
            return Err(PipelineError::InvalidIndex(reason));
        }
    }
    Ok(())
}
