use std::fmt;

use itertools::Itertools;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateKind {
    /// Rolling max equals rolling min; rank pinned to 0.5.
    ZeroRangeRank,
    /// Average loss was exactly zero and replaced by a small epsilon.
    ZeroLossRsi,
    /// Average gain and average loss both zero; RSI pinned to 50.
    FlatRsi,
    /// Zero or non-finite ratio replaced by its neutral value.
    NeutralRatio,
}

impl fmt::Display for DegenerateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DegenerateKind::ZeroRangeRank => "zero-range rank",
            DegenerateKind::ZeroLossRsi => "zero average loss",
            DegenerateKind::FlatRsi => "flat RSI window",
            DegenerateKind::NeutralRatio => "neutral ratio",
        };
        f.write_str(label)
    }
}

/// A non-fatal event recorded while a pipeline stage ran.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Diagnostic {
    DuplicateColumnsDropped { names: Vec<String> },
    ColumnCollision { name: String, occurrences: usize },
    IndexConverted { rows: usize },
    MissingFeatures { names: Vec<String> },
    DegenerateWindow {
        column: String,
        kind: DegenerateKind,
        rows: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DuplicateColumnsDropped { names } => {
                write!(f, "dropped duplicate columns: {}", names.iter().join(", "))
            }
            Diagnostic::ColumnCollision { name, occurrences } => write!(
                f,
                "column '{name}' appears {occurrences} times; using the first occurrence"
            ),
            Diagnostic::IndexConverted { rows } => {
                write!(f, "converted {rows} index labels to calendar dates")
            }
            Diagnostic::MissingFeatures { names } => {
                write!(f, "missing features: {}", names.iter().join(", "))
            }
            Diagnostic::DegenerateWindow { column, kind, rows } => {
                write!(f, "{column}: {kind} on {rows} rows")
            }
        }
    }
}

/// Ordered log of diagnostics returned next to a stage result.
///
/// Every recorded event is also emitted through `tracing`, which is a no-op
/// unless the caller installed a subscriber.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: Diagnostic) {
        match &event {
            Diagnostic::IndexConverted { .. } => info!(event = %event, "diagnostic"),
            Diagnostic::DegenerateWindow { column, kind, rows } => info!(
                column = %column,
                kind = %kind,
                rows = rows,
                "Degenerate window resolved to neutral value"
            ),
            _ => warn!(event = %event, "diagnostic"),
        }
        self.events.push(event);
    }

    /// Record a degenerate-window event when at least one row was affected.
    pub fn record_degenerate(&mut self, column: &str, kind: DegenerateKind, rows: usize) {
        if rows > 0 {
            self.record(Diagnostic::DegenerateWindow {
                column: column.to_string(),
                kind,
                rows,
            });
        }
    }

    pub fn absorb(&mut self, other: Diagnostics) {
        self.events.extend(other.events);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn any(&self, predicate: impl Fn(&Diagnostic) -> bool) -> bool {
        self.events.iter().any(predicate)
    }
}
