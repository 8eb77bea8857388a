use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::RegistryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Returns,
    /// Moving averages and their differences.
    Trend,
    Volatility,
    Momentum,
    Volume,
    /// Bounded oscillators such as RSI and rank normalisation.
    Oscillator,
    /// Boolean threshold features stored as 0/1.
    Flag,
    Label,
}

/// Storage type of a computed column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Float,
    /// 0/1 column stored as Int32.
    Flag,
}

/// How a derived column is computed from earlier columns.
#[derive(Clone, Debug, PartialEq)]
pub enum Rule {
    /// `x_t / x_{t-periods} - 1` after padding missing inputs forward.
    PctChange { source: String, periods: usize },
    /// `ln(x_t / x_{t-1})` on the raw values.
    LogReturn { source: String },
    /// Simple moving average over a full window.
    RollingMean { source: String, window: usize },
    /// Moving average that falls back to the source value where the window is
    /// not yet full.
    RollingMeanOrSource { source: String, window: usize },
    /// Span-based exponential average with adjusted weights.
    Ema { source: String, span: usize },
    /// Sample standard deviation (ddof = 1) over a full window.
    RollingStd { source: String, window: usize },
    /// Position of the value inside its rolling min/max range, 0.5 on a
    /// flat or undefined window.
    RangeRank { source: String, window: usize },
    /// Relative strength index from simple rolling means of gains and losses.
    Rsi { source: String, window: usize },
    /// `numerator / denominator`; a zero denominator or a non-finite result
    /// becomes `neutral`.
    Ratio {
        numerator: String,
        denominator: String,
        neutral: f64,
    },
    /// `left - right`; non-finite results become `neutral`.
    Difference {
        left: String,
        right: String,
        neutral: f64,
    },
    Above { source: String, level: f64 },
    Below { source: String, level: f64 },
    /// 1 when the next row of `source` is strictly positive; the final row is 0.
    NextPositive { source: String },
}

impl Rule {
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Rule::PctChange { source, .. }
            | Rule::LogReturn { source }
            | Rule::RollingMean { source, .. }
            | Rule::RollingMeanOrSource { source, .. }
            | Rule::Ema { source, .. }
            | Rule::RollingStd { source, .. }
            | Rule::RangeRank { source, .. }
            | Rule::Rsi { source, .. }
            | Rule::Above { source, .. }
            | Rule::Below { source, .. }
            | Rule::NextPositive { source } => vec![source.as_str()],
            Rule::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            Rule::Difference { left, right, .. } => vec![left.as_str(), right.as_str()],
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Rule::Above { .. } | Rule::Below { .. } | Rule::NextPositive { .. } => {
                ColumnKind::Flag
            }
            _ => ColumnKind::Float,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub category: FeatureCategory,
    pub rule: Rule,
    /// Hidden features are intermediates; they are computed but not offered
    /// as model inputs.
    pub visible: bool,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, category: FeatureCategory, rule: Rule) -> Self {
        Self {
            name: name.into(),
            category,
            rule,
            visible: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn dependencies(&self) -> Vec<&str> {
        self.rule.dependencies()
    }
}

/// Declarative set of derived columns.
///
/// Specs are kept in registration order; [`FeatureRegistry::resolve`]
/// validates them against the columns already present and returns a compute
/// order in which every spec follows its dependencies.
#[derive(Clone, Debug, Default)]
pub struct FeatureRegistry {
    specs: Vec<FeatureSpec>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: FeatureSpec) -> &mut Self {
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn visible_names(&self) -> Vec<&str> {
        self.specs
            .iter()
            .filter(|spec| spec.visible)
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Validate the registry against `base_columns` and return the specs in
    /// compute order.
    ///
    /// Among specs whose dependencies are satisfied, the earliest registered
    /// one is always emitted first, so the order is deterministic and matches
    /// registration order whenever that order is already valid.
    pub fn resolve<S: AsRef<str>>(
        &self,
        base_columns: &[S],
    ) -> Result<Vec<&FeatureSpec>, RegistryError> {
        let base: HashSet<&str> = base_columns.iter().map(|s| s.as_ref()).collect();
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(self.specs.len());
        for (pos, spec) in self.specs.iter().enumerate() {
            if base.contains(spec.name.as_str()) {
                return Err(RegistryError::ShadowsBaseColumn(spec.name.clone()));
            }
            if positions.insert(spec.name.as_str(), pos).is_some() {
                return Err(RegistryError::DuplicateFeature(spec.name.clone()));
            }
        }

        // Indegree over registry-internal edges only; base columns are
        // available from the start.
        let mut pending = vec![0usize; self.specs.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.specs.len()];
        for (pos, spec) in self.specs.iter().enumerate() {
            for dep in spec.dependencies() {
                if base.contains(dep) {
                    continue;
                }
                match positions.get(dep) {
                    Some(&producer) => {
                        pending[pos] += 1;
                        dependents[producer].push(pos);
                    }
                    None => {
                        return Err(RegistryError::UnknownDependency {
                            feature: spec.name.clone(),
                            dependency: dep.to_string(),
                        });
                    }
                }
            }
        }

        let mut done = vec![false; self.specs.len()];
        let mut order = Vec::with_capacity(self.specs.len());
        while order.len() < self.specs.len() {
            let Some(next) = (0..self.specs.len()).find(|&pos| !done[pos] && pending[pos] == 0)
            else {
                let stuck = self
                    .specs
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| !done[*pos])
                    .map(|(_, spec)| spec.name.clone())
                    .collect();
                return Err(RegistryError::Cycle(stuck));
            };
            done[next] = true;
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
            }
            order.push(&self.specs[next]);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ema(name: &str, source: &str, span: usize) -> FeatureSpec {
        FeatureSpec::new(
            name,
            FeatureCategory::Trend,
            Rule::Ema {
                source: source.to_string(),
                span,
            },
        )
    }

    fn names(order: &[&FeatureSpec]) -> Vec<String> {
        order.iter().map(|spec| spec.name.clone()).collect()
    }

    #[test]
    fn resolve_moves_producers_ahead_of_consumers() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(ema("Signal", "Spread", 9))
            .register(ema("Fast", "Close", 12))
            .register(FeatureSpec::new(
                "Spread",
                FeatureCategory::Trend,
                Rule::Difference {
                    left: "Fast".into(),
                    right: "Close".into(),
                    neutral: 0.0,
                },
            ));
        let order = registry.resolve(&["Close"]).unwrap();
        assert_eq!(names(&order), vec!["Fast", "Spread", "Signal"]);
    }

    #[test]
    fn resolve_keeps_registration_order_when_valid() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(ema("B", "Close", 5))
            .register(ema("A", "Close", 10))
            .register(ema("C", "B", 3));
        let order = registry.resolve(&["Close"]).unwrap();
        assert_eq!(names(&order), vec!["B", "A", "C"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(ema("EMA_5", "Close", 5))
            .register(ema("EMA_5", "Close", 6));
        assert_eq!(
            registry.resolve(&["Close"]).unwrap_err(),
            RegistryError::DuplicateFeature("EMA_5".into())
        );
    }

    #[test]
    fn shadowing_a_base_column_is_rejected() {
        let mut registry = FeatureRegistry::new();
        registry.register(ema("Close", "Open", 5));
        assert_eq!(
            registry.resolve(&["Open", "Close"]).unwrap_err(),
            RegistryError::ShadowsBaseColumn("Close".into())
        );
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut registry = FeatureRegistry::new();
        registry.register(ema("EMA_5", "Adj Close", 5));
        assert!(matches!(
            registry.resolve(&["Close"]),
            Err(RegistryError::UnknownDependency { dependency, .. }) if dependency == "Adj Close"
        ));
    }

    #[test]
    fn cycles_are_reported_with_their_members() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(ema("Ok", "Close", 5))
            .register(ema("X", "Y", 2))
            .register(ema("Y", "X", 2));
        assert_eq!(
            registry.resolve(&["Close"]).unwrap_err(),
            RegistryError::Cycle(vec!["X".into(), "Y".into()])
        );
    }

    #[test]
    fn visible_names_skip_hidden_specs() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(ema("EMA_12", "Close", 12).hidden())
            .register(ema("EMA_20", "Close", 20));
        assert_eq!(registry.visible_names(), vec!["EMA_20"]);
        assert!(!registry.specs()[0].visible);
    }

    #[test]
    fn flag_rules_produce_flag_columns() {
        let rule = Rule::Above {
            source: "RSI".into(),
            level: 70.0,
        };
        assert_eq!(rule.kind(), ColumnKind::Flag);
        assert_eq!(rule.dependencies(), vec!["RSI"]);
        let difference = Rule::Difference {
            left: "EMA_12".into(),
            right: "EMA_26".into(),
            neutral: 0.0,
        };
        assert_eq!(difference.kind(), ColumnKind::Float);
    }
}
