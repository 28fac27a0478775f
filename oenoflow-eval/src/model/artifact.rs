//! JSON model artifacts.

use super::Model;
use crate::data::FeatureMatrix;
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A serialized regression model, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Linear(LinearModel),
    Mean(MeanModel),
}

/// Linear model: `intercept + sum(coefficient * feature)`.
///
/// Covers plain least squares as well as regularized fits such as ElasticNet;
/// the regularization settings only matter at training time and are carried
/// along in `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Predicts the training-set mean for every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanModel {
    pub value: f64,
}

impl ModelArtifact {
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::Linear(m) if m.feature_names.len() != m.coefficients.len() => {
                Err(EvalError::serialization(format!(
                    "linear model has {} feature names but {} coefficients",
                    m.feature_names.len(),
                    m.coefficients.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl LinearModel {
    fn predict_rows(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let indices = self
            .feature_names
            .iter()
            .map(|name| {
                features.column_index(name).ok_or_else(|| {
                    EvalError::model(format!("feature '{name}' required by model is missing"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let unused = features.columns.len().saturating_sub(indices.len());
        if unused > 0 {
            tracing::warn!(unused, "Dataset has columns the model does not use");
        }

        Ok(features
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .zip(&self.coefficients)
                    .fold(self.intercept, |acc, (&i, &w)| acc + w * row[i])
            })
            .collect())
    }
}

impl Model for ModelArtifact {
    fn name(&self) -> &str {
        match self {
            Self::Linear(_) => "linear",
            Self::Mean(_) => "mean",
        }
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        match self {
            Self::Linear(m) => m.predict_rows(features),
            Self::Mean(m) => Ok(vec![m.value; features.row_count()]),
        }
    }

    fn to_artifact_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}
