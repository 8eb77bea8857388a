use polars::prelude::*;

use crate::data::PriceFrame;
use crate::error::PipelineResult;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FillStep {
    /// Carry the last defined value forward.
    Forward,
    /// Carry the next defined value backward.
    Backward,
    /// Replace anything still undefined with a constant.
    Constant(f64),
}

/// Ordered sequence of fill steps applied to a numeric column.
///
/// NaN and both infinities count as undefined, so a column that has been
/// through a policy ending in [`FillStep::Constant`] is always finite.
#[derive(Clone, Debug, PartialEq)]
pub struct FillPolicy {
    steps: Vec<FillStep>,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl FillPolicy {
    pub fn new(steps: Vec<FillStep>) -> Self {
        Self { steps }
    }

    /// Forward-fill, then backward-fill, then zero.
    pub fn standard() -> Self {
        Self::new(vec![
            FillStep::Forward,
            FillStep::Backward,
            FillStep::Constant(0.0),
        ])
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        let mut out: Vec<f64> = values
            .iter()
            .map(|v| if v.is_finite() { *v } else { f64::NAN })
            .collect();
        for step in &self.steps {
            match step {
                FillStep::Forward => {
                    let mut last = f64::NAN;
                    for v in out.iter_mut() {
                        if v.is_nan() {
                            *v = last;
                        } else {
                            last = *v;
                        }
                    }
                }
                FillStep::Backward => {
                    let mut next = f64::NAN;
                    for v in out.iter_mut().rev() {
                        if v.is_nan() {
                            *v = next;
                        } else {
                            next = *v;
                        }
                    }
                }
                FillStep::Constant(c) => {
                    for v in out.iter_mut().filter(|v| v.is_nan()) {
                        *v = *c;
                    }
                }
            }
        }
        out
    }

    /// Apply the policy to every float column of `frame`. Integer flag columns
    /// are left as they are.
    pub fn apply_frame(&self, frame: PriceFrame) -> PipelineResult<PriceFrame> {
        let targets: Vec<String> = frame
            .data_frame()
            .get_columns()
            .iter()
            .filter(|series| matches!(series.dtype(), DataType::Float64 | DataType::Float32))
            .map(|series| series.name().to_string())
            .collect();
        let mut frame = frame;
        for name in targets {
            let filled = self.apply(&frame.float_column(&name)?);
            frame = frame.with_float_column(&name, filled)?;
        }
        Ok(frame)
    }
}
