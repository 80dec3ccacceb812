//! Error taxonomy for training and detection.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = IdsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IdsError {
    /// A persisted artifact the session needs is absent.
    #[error("artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// A persisted artifact exists but cannot be trusted.
    #[error("artifact corrupt: {}: {reason}", path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    /// Aligned column count disagrees with what the scaler or model expects.
    #[error(
        "feature mismatch for {sample}: expected {expected} features, got {found}; \
         retrain or restore a coherent artifact set"
    )]
    FeatureMismatch {
        sample: String,
        expected: usize,
        found: usize,
    },

    #[error("{sample}: column '{column}' holds non-numeric value '{value}'")]
    InvalidValue {
        sample: String,
        column: String,
        value: String,
    },

    #[error("label column '{0}' not found in dataset")]
    MissingLabelColumn(String),

    #[error("dataset: {0}")]
    Dataset(String),

    #[error("model: {0}")]
    Model(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl IdsError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IdsError::ArtifactCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Session-fatal errors: the artifact set cannot be used at all.
    pub fn is_artifact_error(&self) -> bool {
        matches!(
            self,
            IdsError::ArtifactMissing(_) | IdsError::ArtifactCorrupt { .. }
        )
    }
}
