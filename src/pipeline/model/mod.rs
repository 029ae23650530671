//! Trained model components and their on-disk artifact bundle.

pub mod artifact;
pub mod gbdt;
pub mod scaler;

pub use artifact::{ArtifactBundle, BundleMetadata};
pub use gbdt::{GradientBoostedClassifier, Hyperparameters};
pub use scaler::StandardScaler;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No model bundle installed at {0}")]
    Missing(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch for {file}")]
    ChecksumMismatch { file: String },

    #[error("Feature order mismatch: bundle has {found:?}")]
    FeatureOrderMismatch { found: Vec<String> },

    #[error("Corrupt model bundle: {0}")]
    Corrupt(String),

    #[error("Bundle version already exists: {0}")]
    VersionExists(String),

    #[error("Cannot fit on an empty training set")]
    EmptyTrainingSet,
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
