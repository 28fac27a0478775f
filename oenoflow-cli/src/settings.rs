//! Stage configuration loading.
//!
//! Uses `figment` for layered configuration: pipeline config file -> params
//! file -> schema file -> environment (`OENOFLOW_MODEL_EVALUATION__MLFLOW_URI`, ...).

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use oenoflow_eval::{EvaluationConfig, TrackingAuth};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Everything the stage reads from the pipeline's configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSettings {
    pub model_evaluation: ModelEvaluationSettings,
    /// Hyper-parameters of the trained model, logged verbatim.
    #[serde(default)]
    pub elastic_net: BTreeMap<String, serde_json::Value>,
    pub target_column: TargetColumn,
}

/// `[model_evaluation]` section of the pipeline config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvaluationSettings {
    /// Stage working directory, created before the stage runs.
    pub root_dir: PathBuf,
    pub test_data_path: PathBuf,
    pub model_path: PathBuf,
    pub metric_file_name: PathBuf,
    pub mlflow_uri: String,
    #[serde(default)]
    pub experiment_name: Option<String>,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default)]
    pub artifact_copy_path: Option<PathBuf>,
}

/// `[target_column]` section of the schema file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
}

/// Load the stage settings from the three pipeline files plus environment.
///
/// Missing files contribute nothing; a missing required key is an error.
pub fn load_settings(
    config: &Path,
    params: &Path,
    schema: &Path,
) -> Result<StageSettings, Box<figment::Error>> {
    Figment::new()
        .merge(Toml::file(config))
        .merge(Toml::file(params))
        .merge(Toml::file(schema))
        .merge(Env::prefixed("OENOFLOW_").split("__"))
        .extract()
        .map_err(Box::new)
}

impl StageSettings {
    /// Create the stage root directory.
    pub fn prepare_root_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.model_evaluation.root_dir)?;
        tracing::info!(
            path = %self.model_evaluation.root_dir.display(),
            "Created directory"
        );
        Ok(())
    }

    pub fn into_evaluation_config(self, credentials: TrackingAuth) -> EvaluationConfig {
        let me = self.model_evaluation;
        let mut config = EvaluationConfig::new(
            me.test_data_path,
            me.model_path,
            self.target_column.name,
            me.metric_file_name,
            me.mlflow_uri,
        )
        .with_credentials(credentials);
        config.hyper_parameters = self.elastic_net;
        config.experiment_name = me.experiment_name;
        config.run_name = me.run_name;
        if let Some(path) = me.artifact_copy_path {
            config.artifact_copy_path = path;
        }
        config
    }
}

/// Tracking credentials from the standard MLflow environment variables.
pub fn credentials_from_env() -> TrackingAuth {
    credentials_from(|key| std::env::var(key).ok())
}

/// A token wins over username/password; a username without a password is ignored.
pub fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> TrackingAuth {
    let present = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(token) = present("MLFLOW_TRACKING_TOKEN") {
        return TrackingAuth::Bearer { token };
    }
    match (
        present("MLFLOW_TRACKING_USERNAME"),
        present("MLFLOW_TRACKING_PASSWORD"),
    ) {
        (Some(username), Some(password)) => TrackingAuth::Basic { username, password },
        (Some(_), None) => {
            tracing::warn!("MLFLOW_TRACKING_USERNAME set without MLFLOW_TRACKING_PASSWORD");
            TrackingAuth::None
        }
        _ => TrackingAuth::None,
    }
}
