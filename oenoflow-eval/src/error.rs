//! Error types for the oenoflow-eval crate.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of an [`EvalError`], used by the stage driver when
/// reporting a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unreadable inputs, missing target column, malformed data.
    Input,
    /// Corrupt or incompatible model artifact, JSON encode/decode failures.
    Serialization,
    /// Tracking service unreachable, rejected the request, or upload failed.
    RemoteService,
    /// Local filesystem failure while writing outputs.
    Io,
}

/// Top-level error type for evaluation runs.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Target column '{column}' not found in dataset (columns: {available})")]
    MissingTargetColumn { column: String, available: String },

    #[error("Input error: {0}")]
    Input(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Tracking service error: {0}")]
    RemoteService(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EvalError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteService(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Map an I/O error raised while reading `path`, turning `NotFound`
    /// into [`EvalError::FileNotFound`].
    pub fn reading(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path.to_path_buf())
        } else {
            Self::Input(format!("failed to read {}: {err}", path.display()))
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound(_) | Self::MissingTargetColumn { .. } | Self::Input(_) => {
                ErrorKind::Input
            }
            Self::Csv(_) | Self::Config(_) => ErrorKind::Input,
            Self::Model(_) | Self::Serialization(_) | Self::Json(_) => ErrorKind::Serialization,
            Self::RemoteService(_) | Self::Http(_) => ErrorKind::RemoteService,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_maps_not_found() {
        let err = EvalError::reading(
            Path::new("missing.csv"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, EvalError::FileNotFound(ref p) if p == Path::new("missing.csv")));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_reading_other_io_is_input() {
        let err = EvalError::reading(
            Path::new("locked.csv"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(EvalError::model("bad").kind(), ErrorKind::Serialization);
        assert_eq!(EvalError::remote("down").kind(), ErrorKind::RemoteService);
        let missing = EvalError::MissingTargetColumn {
            column: "quality".into(),
            available: "alcohol, pH".into(),
        };
        assert_eq!(missing.kind(), ErrorKind::Input);
        assert!(missing.to_string().contains("quality"));
    }
}
