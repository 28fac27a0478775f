//! # oenoflow-eval — model evaluation stage
//!
//! Scores a trained regression model on held-out test data, writes the
//! metrics (`rmse`, `mae`, `r2`) to a local JSON file and records the run in
//! an MLflow-compatible tracking service together with the hyper-parameters
//! and a copy of the model.
//!
//! The stage driver builds an [`EvaluationConfig`] and calls
//! [`Evaluator::evaluate`] once per pipeline run.

pub mod config;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod tracking;

// Re-exports
pub use config::{EvaluationConfig, TrackingAuth};
pub use error::{ErrorKind, EvalError};
pub use evaluator::Evaluator;
pub use metrics::{MetricSet, eval_metrics};
pub use model::{JsonModelLoader, Model, ModelLoader};
pub use tracking::{MlflowClient, TrackingClient};
