//! Loading the test dataset from delimited text.

use crate::data::dataset::Dataset;
use crate::error::{EvalError, Result};
use std::path::PathBuf;

/// Delimited text file with a header row and numeric cells.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub async fn load(&self) -> Result<Dataset> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| EvalError::reading(&self.path, e))?;
        let dataset = self.parse(&bytes)?;
        tracing::info!(
            path = %self.path.display(),
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Loaded test data"
        );
        Ok(dataset)
    }

    fn parse(&self, bytes: &[u8]) -> Result<Dataset> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(EvalError::input(format!(
                "{} has no header row",
                self.path.display()
            )));
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(columns.len());
            for (col, cell) in columns.iter().zip(record.iter()) {
                let value = cell
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        EvalError::input(format!(
                            "{}: value '{cell}' in column '{col}' (row {}) is not a finite number",
                            self.path.display(),
                            line + 1
                        ))
                    })?;
                row.push(value);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(EvalError::input(format!(
                "{} contains no data rows",
                self.path.display()
            )));
        }

        Ok(Dataset::new(columns, rows))
    }
}
