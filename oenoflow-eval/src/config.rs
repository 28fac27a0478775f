//! Configuration types for an evaluation run.
//!
//! The stage driver builds an [`EvaluationConfig`] once and hands it to the
//! [`Evaluator`](crate::Evaluator). Nothing in this crate reads environment
//! variables or configuration files on its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Everything one evaluation run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Held-out test data (delimited text with a header row).
    pub test_data_path: PathBuf,
    /// Serialized model produced by the training stage.
    pub model_path: PathBuf,
    /// Name of the column holding the regression target.
    pub target_column: String,
    /// Where the metrics JSON is written.
    pub metric_file_path: PathBuf,
    /// Base URL of the MLflow-compatible tracking service.
    pub tracking_uri: String,
    /// Hyper-parameters logged to the tracking run.
    #[serde(default)]
    pub hyper_parameters: BTreeMap<String, serde_json::Value>,
    /// Tracking service credentials.
    #[serde(default)]
    pub credentials: TrackingAuth,
    /// Experiment to log into. The service's default experiment is used when unset.
    #[serde(default)]
    pub experiment_name: Option<String>,
    /// Optional display name for the tracking run.
    #[serde(default)]
    pub run_name: Option<String>,
    /// Local path the model is re-serialized to before upload.
    #[serde(default = "default_artifact_copy_path")]
    pub artifact_copy_path: PathBuf,
    /// Per-request timeout for tracking service calls (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl EvaluationConfig {
    /// Create a config with the required fields and defaults for the rest.
    pub fn new(
        test_data_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        target_column: impl Into<String>,
        metric_file_path: impl Into<PathBuf>,
        tracking_uri: impl Into<String>,
    ) -> Self {
        Self {
            test_data_path: test_data_path.into(),
            model_path: model_path.into(),
            target_column: target_column.into(),
            metric_file_path: metric_file_path.into(),
            tracking_uri: tracking_uri.into(),
            hyper_parameters: BTreeMap::new(),
            credentials: TrackingAuth::None,
            experiment_name: None,
            run_name: None,
            artifact_copy_path: default_artifact_copy_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    pub fn with_hyper_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.hyper_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, credentials: TrackingAuth) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = Some(name.into());
        self
    }

    pub fn with_artifact_copy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_copy_path = path.into();
        self
    }
}

fn default_artifact_copy_path() -> PathBuf {
    PathBuf::from("models/model.json")
}

fn default_request_timeout() -> u64 {
    30
}

/// Credentials presented to the tracking service.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
}

impl fmt::Debug for TrackingAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}
