//! MLflow REST API (2.0) client.

use super::{RunInfo, RunRequest, RunStatus, TrackingClient};
use crate::config::TrackingAuth;
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// The service rejects `log-batch` requests carrying more params than this.
const MAX_PARAMS_PER_BATCH: usize = 100;

/// Experiment used when no experiment name is configured.
const DEFAULT_EXPERIMENT_ID: &str = "0";

/// Talks to an MLflow tracking server (or a compatible host such as DagsHub).
#[derive(Clone)]
pub struct MlflowClient {
    base: Url,
    client: reqwest::Client,
    auth: TrackingAuth,
}

impl std::fmt::Debug for MlflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlflowClient")
            .field("base", &self.base.as_str())
            .field("auth", &self.auth)
            .finish()
    }
}

impl MlflowClient {
    pub fn new(tracking_uri: &str, auth: TrackingAuth, timeout: Duration) -> Result<Self> {
        let url = Url::parse(tracking_uri)
            .map_err(|e| EvalError::config(format!("invalid tracking URI '{tracking_uri}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EvalError::config(format!(
                "tracking URI must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base: url,
            client,
            auth,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Upload URL for `file_name` under the run's artifact root. Each segment
    /// is percent-encoded.
    fn artifact_url(&self, run: &RunInfo, file_name: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| EvalError::config(format!("tracking URI {} has no path", self.base)))?
            .pop_if_empty()
            .extend(["api", "2.0", "mlflow-artifacts", "artifacts"])
            .extend(artifact_root(run).split('/'))
            .push(file_name);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            TrackingAuth::None => request,
            TrackingAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            TrackingAuth::Bearer { token } => request.bearer_auth(token),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        tracing::debug!(%url, "Tracking request");
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| EvalError::remote(format!("{url}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(EvalError::remote(format!(
            "{url} returned {status}: {}",
            truncate(&body, 300)
        )))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let resp = self.send(self.client.post(&url).json(body), &url).await?;
        resp.json::<R>()
            .await
            .map_err(|e| EvalError::remote(format!("{url}: unexpected response body: {e}")))
    }

    async fn experiment_id(&self, name: Option<&str>) -> Result<String> {
        let Some(name) = name else {
            return Ok(DEFAULT_EXPERIMENT_ID.to_string());
        };

        let url = self.endpoint("api/2.0/mlflow/experiments/get-by-name");
        let request = self
            .authorize(self.client.get(&url))
            .query(&[("experiment_name", name)]);
        tracing::debug!(%url, experiment = name, "Resolving experiment");
        let resp = request
            .send()
            .await
            .map_err(|e| EvalError::remote(format!("{url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(experiment = name, "Experiment not found, creating it");
            let created: CreateExperimentResponse = self
                .post_json(
                    "api/2.0/mlflow/experiments/create",
                    &serde_json::json!({ "name": name }),
                )
                .await?;
            return Ok(created.experiment_id);
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EvalError::remote(format!(
                "{url} returned {status}: {}",
                truncate(&body, 300)
            )));
        }
        let found: GetExperimentResponse = resp
            .json()
            .await
            .map_err(|e| EvalError::remote(format!("{url}: unexpected response body: {e}")))?;
        Ok(found.experiment.experiment_id)
    }

    async fn log_batch(&self, run: &RunInfo, batch: &LogBatch<'_>) -> Result<()> {
        let _: serde_json::Value = self
            .post_json("api/2.0/mlflow/runs/log-batch", &BatchRequest { run_id: &run.run_id, batch })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TrackingClient for MlflowClient {
    async fn start_run(&self, request: &RunRequest) -> Result<RunInfo> {
        let experiment_id = self.experiment_id(request.experiment_name.as_deref()).await?;

        let mut tags: Vec<Tag<'_>> = request
            .tags
            .iter()
            .map(|(key, value)| Tag { key, value })
            .collect();
        if let Some(name) = &request.run_name {
            tags.push(Tag {
                key: "mlflow.runName",
                value: name,
            });
        }

        let body = CreateRunRequest {
            experiment_id: &experiment_id,
            start_time: now_millis(),
            run_name: request.run_name.as_deref(),
            tags,
        };
        let resp: CreateRunResponse = self.post_json("api/2.0/mlflow/runs/create", &body).await?;
        let info = resp.run.info;
        tracing::info!(run_id = %info.run_id, experiment_id = %info.experiment_id, "Started tracking run");
        Ok(RunInfo {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            artifact_uri: info.artifact_uri,
        })
    }

    async fn log_params(&self, run: &RunInfo, params: &BTreeMap<String, String>) -> Result<()> {
        let all: Vec<Param<'_>> = params
            .iter()
            .map(|(key, value)| Param { key, value })
            .collect();
        for chunk in all.chunks(MAX_PARAMS_PER_BATCH) {
            self.log_batch(
                run,
                &LogBatch {
                    params: chunk,
                    metrics: &[],
                },
            )
            .await?;
        }
        tracing::debug!(run_id = %run.run_id, count = params.len(), "Logged params");
        Ok(())
    }

    async fn log_metrics(&self, run: &RunInfo, metrics: &[(&str, f64)]) -> Result<()> {
        let timestamp = now_millis();
        let entries: Vec<Metric<'_>> = metrics
            .iter()
            .map(|(key, value)| Metric {
                key,
                value: *value,
                timestamp,
                step: 0,
            })
            .collect();
        self.log_batch(
            run,
            &LogBatch {
                params: &[],
                metrics: &entries,
            },
        )
        .await?;
        tracing::debug!(run_id = %run.run_id, count = metrics.len(), "Logged metrics");
        Ok(())
    }

    async fn log_artifact(&self, run: &RunInfo, local_path: &Path) -> Result<()> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                EvalError::input(format!("artifact path {} has no file name", local_path.display()))
            })?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| EvalError::reading(local_path, e))?;
        let size = bytes.len();

        let url = self.artifact_url(run, file_name)?;
        let request = self
            .client
            .put(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        self.send(request, url.as_str()).await?;
        tracing::info!(run_id = %run.run_id, file = file_name, bytes = size, "Uploaded artifact");
        Ok(())
    }

    async fn end_run(&self, run: &RunInfo, status: RunStatus) -> Result<()> {
        let body = UpdateRunRequest {
            run_id: &run.run_id,
            status,
            end_time: now_millis(),
        };
        let _: serde_json::Value = self.post_json("api/2.0/mlflow/runs/update", &body).await?;
        tracing::info!(run_id = %run.run_id, ?status, "Ended tracking run");
        Ok(())
    }
}

/// Path of the run's artifact root relative to the artifact proxy endpoint.
fn artifact_root(run: &RunInfo) -> String {
    run.artifact_uri
        .as_deref()
        .filter(|uri| uri.starts_with("mlflow-artifacts:"))
        .and_then(|uri| Url::parse(uri).ok())
        .map(|url| url.path().trim_matches('/').to_string())
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| format!("{}/{}/artifacts", run.experiment_id, run.run_id))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Tag<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct Param<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct Metric<'a> {
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: i64,
}

#[derive(Serialize)]
struct LogBatch<'a> {
    params: &'a [Param<'a>],
    metrics: &'a [Metric<'a>],
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    run_id: &'a str,
    #[serde(flatten)]
    batch: &'a LogBatch<'a>,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a str,
    start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_name: Option<&'a str>,
    tags: Vec<Tag<'a>>,
}

#[derive(Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    end_time: i64,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    run: RunEnvelope,
}

#[derive(Deserialize)]
struct RunEnvelope {
    info: WireRunInfo,
}

#[derive(Deserialize)]
struct WireRunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    artifact_uri: Option<String>,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: WireExperiment,
}

#[derive(Deserialize)]
struct WireExperiment {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}
