use polars::prelude::PolarsError;
use thiserror::Error;

/// Structural failures of the dataset pipeline.
///
/// Degenerate numeric inputs (flat windows, zero divisors) are never reported
/// here; they are resolved to neutral values and surfaced as
/// [`crate::diagnostics::Diagnostic`] events instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Insufficient data after cleaning: {rows} samples")]
    InsufficientData { rows: usize },

    #[error("Missing required column '{0}'")]
    MissingRequiredColumn(String),

    #[error("Invalid date index: {0}")]
    InvalidIndex(String),

    #[error("Column '{column}' has {found} values but the index has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Validation failures of a [`crate::feature::FeatureRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Feature '{0}' is registered more than once")]
    DuplicateFeature(String),

    #[error("Feature '{0}' shadows a base column")]
    ShadowsBaseColumn(String),

    #[error("Feature '{feature}' depends on unknown column '{dependency}'")]
    UnknownDependency { feature: String, dependency: String },

    #[error("Dependency cycle between features: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
