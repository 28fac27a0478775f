//! In-memory tabular data and the feature/target split.

use crate::error::{EvalError, Result};

/// Numeric table loaded from the test-data file.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Separate the target column from the features.
    ///
    /// The returned [`FeatureMatrix`] never contains `target`.
    pub fn split_target(&self, target: &str) -> Result<(FeatureMatrix, Vec<f64>)> {
        let idx = self
            .column_index(target)
            .ok_or_else(|| EvalError::MissingTargetColumn {
                column: target.to_string(),
                available: self.columns.join(", "),
            })?;

        let columns = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, c)| c.clone())
            .collect();

        let mut targets = Vec::with_capacity(self.rows.len());
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            targets.push(row[idx]);
            let features = row
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, v)| *v)
                .collect();
            rows.push(features);
        }

        Ok((FeatureMatrix { columns, rows }, targets))
    }
}

/// Named feature columns handed to a model for prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
