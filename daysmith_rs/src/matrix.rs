use crate::error::{PipelineError, PipelineResult};

/// Dense row-major feature matrix with named columns.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    n_rows: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    /// Assemble a matrix from equally long columns.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> PipelineResult<Self> {
        let n_rows = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        for (name, values) in &columns {
            if values.len() != n_rows {
                return Err(PipelineError::LengthMismatch {
                    column: name.clone(),
                    expected: n_rows,
                    found: values.len(),
                });
            }
        }
        let n_cols = columns.len();
        let mut values = vec![0.0; n_rows * n_cols];
        for (col, (_, column)) in columns.iter().enumerate() {
            for (row, value) in column.iter().enumerate() {
                values[row * n_cols + col] = *value;
            }
        }
        let names = columns.into_iter().map(|(name, _)| name).collect();
        Ok(Self {
            names,
            n_rows,
            values,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.values[row * n_cols..(row + 1) * n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |row| self.row(row))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.n_rows && col < self.n_cols()).then(|| self.values[row * self.n_cols() + col])
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let col = self.names.iter().position(|n| n == name)?;
        Some((0..self.n_rows).map(|row| self.row(row)[col]).collect())
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// First `rows` rows as a new matrix.
    pub fn head_rows(&self, rows: usize) -> Self {
        let rows = rows.min(self.n_rows);
        Self {
            names: self.names.clone(),
            n_rows: rows,
            values: self.values[..rows * self.n_cols()].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureMatrix {
        FeatureMatrix::from_columns(vec![
            ("a".to_string(), vec![1.0, 2.0, 3.0]),
            ("b".to_string(), vec![10.0, 20.0, 30.0]),
        ])
        .unwrap()
    }

    #[test]
    fn rows_are_laid_out_contiguously() {
        let matrix = sample();
        assert_eq!(matrix.row(1), &[2.0, 20.0]);
        assert_eq!(matrix.get(2, 1), Some(30.0));
        assert_eq!(matrix.get(3, 0), None);
        assert_eq!(matrix.column("b"), Some(vec![10.0, 20.0, 30.0]));
    }

    #[test]
    fn head_rows_truncates() {
        let head = sample().head_rows(2);
        assert_eq!(head.n_rows(), 2);
        assert_eq!(head.rows().last(), Some(&[2.0, 20.0][..]));
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let result = FeatureMatrix::from_columns(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ]);
        assert!(matches!(result, Err(PipelineError::LengthMismatch { .. })));
    }
}
