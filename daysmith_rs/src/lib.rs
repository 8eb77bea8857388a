pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod feature;
pub mod impute;
pub mod matrix;
pub mod sanitize;
pub mod selector;

pub use config::PipelineConfig;
pub use data::{PriceFrame, RawColumn, RawIndex, RawTable};
pub use diagnostics::{DegenerateKind, Diagnostic, Diagnostics};
pub use error::{PipelineError, PipelineResult, RegistryError};
pub use feature::{ColumnKind, FeatureCategory, FeatureRegistry, FeatureSpec, Rule};
pub use impute::{FillPolicy, FillStep};
pub use matrix::FeatureMatrix;
pub use sanitize::{Sanitized, sanitize};
pub use selector::{FeatureScore, rank_features, score_features, select_best_features};
