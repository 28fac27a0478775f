//! The model seam: anything that can predict a target from a feature matrix.
//!
//! The evaluator only sees [`Model`] and [`ModelLoader`]. The JSON artifact
//! format written by the training stage lives in [`artifact`].

pub mod artifact;

use crate::data::FeatureMatrix;
use crate::error::{EvalError, Result};
use std::path::Path;

pub use artifact::{LinearModel, MeanModel, ModelArtifact};

/// A trained regression model.
pub trait Model: Send + Sync {
    /// Short identifier for logs and run tags.
    fn name(&self) -> &str;

    /// Predict one value per row of `features`.
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// The model in its artifact format, for upload.
    fn to_artifact_bytes(&self) -> Result<Vec<u8>>;
}

/// Deserializes a [`Model`] from a file.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Model>>;
}

/// Loads [`ModelArtifact`] JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModelLoader;

impl ModelLoader for JsonModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Model>> {
        let bytes = std::fs::read(path).map_err(|e| EvalError::reading(path, e))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            EvalError::serialization(format!(
                "{} is not a valid model artifact: {e}",
                path.display()
            ))
        })?;
        artifact.validate()?;
        tracing::info!(path = %path.display(), model = artifact.name(), "Loaded model");
        Ok(Box::new(LoadedArtifact {
            artifact,
            raw: bytes,
        }))
    }
}

/// An artifact read from disk. Uploads reuse the file's bytes so keys this
/// crate does not model survive the round trip.
struct LoadedArtifact {
    artifact: ModelArtifact,
    raw: Vec<u8>,
}

impl Model for LoadedArtifact {
    fn name(&self) -> &str {
        self.artifact.name()
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        self.artifact.predict(features)
    }

    fn to_artifact_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.raw.clone())
    }
}
