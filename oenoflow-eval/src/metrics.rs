//! Regression accuracy metrics.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use smartcore::metrics::{mean_absolute_error, mean_squared_error, r2};

/// Scores for one evaluation run. Field order is the JSON key order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl MetricSet {
    /// Metric name/value pairs in logging order.
    pub fn entries(&self) -> [(&'static str, f64); 3] {
        [("rmse", self.rmse), ("mae", self.mae), ("r2", self.r2)]
    }
}

/// Score `predicted` against `actual`.
///
/// A constant `actual` has no variance to explain; R² is then 1.0 for a
/// perfect fit and 0.0 otherwise.
pub fn eval_metrics(actual: &[f64], predicted: &[f64]) -> Result<MetricSet> {
    if actual.is_empty() {
        return Err(EvalError::input("cannot score an empty target column"));
    }
    if actual.len() != predicted.len() {
        return Err(EvalError::model(format!(
            "model returned {} predictions for {} rows",
            predicted.len(),
            actual.len()
        )));
    }

    if let Some(i) = actual.iter().position(|v| !v.is_finite()) {
        return Err(EvalError::input(format!(
            "target value {} at row {} is not a finite number",
            actual[i],
            i + 1
        )));
    }
    if let Some(i) = predicted.iter().position(|v| !v.is_finite()) {
        return Err(EvalError::model(format!(
            "model predicted {} for row {}",
            predicted[i],
            i + 1
        )));
    }

    let y_true = actual.to_vec();
    let y_pred = predicted.to_vec();

    let mse: f64 = mean_squared_error(&y_true, &y_pred);
    let mae: f64 = mean_absolute_error(&y_true, &y_pred);
    let r2_score: f64 = if y_true.iter().all(|v| *v == y_true[0]) {
        if mse == 0.0 { 1.0 } else { 0.0 }
    } else {
        r2(&y_true, &y_pred)
    };

    let metrics = MetricSet {
        rmse: mse.sqrt(),
        mae,
        r2: r2_score,
    };
    if metrics.entries().iter().any(|(_, v)| !v.is_finite()) {
        return Err(EvalError::model(format!(
            "scores are not finite: {metrics:?}"
        )));
    }
    Ok(metrics)
}
