//! Experiment tracking: the client seam and the MLflow REST implementation.

pub mod mlflow;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub use mlflow::MlflowClient;

/// Identifies a tracking run once it has been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    /// Artifact root reported by the service, if any.
    pub artifact_uri: Option<String>,
}

/// Terminal state of a tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Finished,
    Failed,
}

/// What to create when opening a run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub experiment_name: Option<String>,
    pub run_name: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Client for a remote experiment-tracking service.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    async fn start_run(&self, request: &RunRequest) -> Result<RunInfo>;

    async fn log_params(&self, run: &RunInfo, params: &BTreeMap<String, String>) -> Result<()>;

    async fn log_metrics(&self, run: &RunInfo, metrics: &[(&str, f64)]) -> Result<()>;

    /// Upload a local file to the root of the run's artifact store.
    async fn log_artifact(&self, run: &RunInfo, local_path: &Path) -> Result<()>;

    async fn end_run(&self, run: &RunInfo, status: RunStatus) -> Result<()>;
}

/// Render hyper-parameter values the way tracking services store them:
/// strings verbatim, everything else as compact JSON.
pub fn stringify_params(
    params: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
