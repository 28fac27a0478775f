//! The evaluation procedure: score a trained model on held-out data and
//! publish the results.

use crate::config::EvaluationConfig;
use crate::data::CsvSource;
use crate::error::Result;
use crate::metrics::{MetricSet, eval_metrics};
use crate::model::{JsonModelLoader, Model, ModelLoader};
use crate::persistence;
use crate::tracking::{
    MlflowClient, RunInfo, RunRequest, RunStatus, TrackingClient, stringify_params,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Value of the `mlflow.source.name` tag on every run.
pub const SOURCE_NAME: &str = "oenoflow-eval-stage";

/// Runs one evaluation: load data and model, score, write metrics, publish.
pub struct Evaluator {
    config: EvaluationConfig,
    loader: Box<dyn ModelLoader>,
    tracker: Box<dyn TrackingClient>,
}

impl Evaluator {
    /// Build an evaluator with the JSON model loader and an MLflow client
    /// pointed at `config.tracking_uri`.
    pub fn new(config: EvaluationConfig) -> Result<Self> {
        let tracker = MlflowClient::new(
            &config.tracking_uri,
            config.credentials.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::with_parts(
            config,
            Box::new(JsonModelLoader),
            Box::new(tracker),
        ))
    }

    pub fn with_parts(
        config: EvaluationConfig,
        loader: Box<dyn ModelLoader>,
        tracker: Box<dyn TrackingClient>,
    ) -> Self {
        Self {
            config,
            loader,
            tracker,
        }
    }

    /// Score the model and publish the results.
    ///
    /// The metrics file is written before the tracking service is contacted,
    /// so it survives a tracking failure. Nothing is retried.
    pub async fn evaluate(&self) -> Result<MetricSet> {
        let cfg = &self.config;

        let dataset = CsvSource::new(&cfg.test_data_path).load().await?;
        let model = self.loader.load(&cfg.model_path)?;
        let (features, actual) = dataset.split_target(&cfg.target_column)?;

        let predicted = model.predict(&features)?;
        let metrics = eval_metrics(&actual, &predicted)?;
        tracing::info!(
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            rows = actual.len(),
            "Computed metrics"
        );

        persistence::write_json_pretty(&cfg.metric_file_path, &metrics)?;
        tracing::info!(path = %cfg.metric_file_path.display(), "Saved metrics");

        self.publish(model.as_ref(), &metrics).await?;
        Ok(metrics)
    }

    async fn publish(&self, model: &dyn Model, metrics: &MetricSet) -> Result<()> {
        let mut tags = BTreeMap::new();
        tags.insert("mlflow.source.name".to_string(), SOURCE_NAME.to_string());
        tags.insert("model.kind".to_string(), model.name().to_string());
        let request = RunRequest {
            experiment_name: self.config.experiment_name.clone(),
            run_name: self.config.run_name.clone(),
            tags,
        };

        let run = self.tracker.start_run(&request).await?;
        match self.log_run(&run, model, metrics).await {
            Ok(()) => self.tracker.end_run(&run, RunStatus::Finished).await,
            Err(e) => {
                if let Err(end_err) = self.tracker.end_run(&run, RunStatus::Failed).await {
                    tracing::warn!(
                        run_id = %run.run_id,
                        error = %end_err,
                        "Could not mark tracking run as failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn log_run(&self, run: &RunInfo, model: &dyn Model, metrics: &MetricSet) -> Result<()> {
        let params = stringify_params(&self.config.hyper_parameters);
        self.tracker.log_params(run, &params).await?;
        self.tracker.log_metrics(run, &metrics.entries()).await?;

        let artifact_path = &self.config.artifact_copy_path;
        persistence::atomic_write(artifact_path, &model.to_artifact_bytes()?)?;
        self.tracker.log_artifact(run, artifact_path).await
    }
}
