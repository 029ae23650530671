//! Versioned, checksummed artifact bundles.
//!
//! Layout under the model root:
//!
//! ```text
//! CURRENT                      <- name of the serving bundle
//! bundles/<version>/scaler.json
//! bundles/<version>/classifier.json
//! bundles/<version>/metadata.json
//! ```
//!
//! A bundle is written into a staging directory, renamed into place, and only
//! then published by atomically replacing `CURRENT`. A crash at any point
//! leaves the previous bundle serving.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{GradientBoostedClassifier, Hyperparameters, ModelError, StandardScaler};
use crate::pipeline::features::{feature_order_names, FEATURE_ORDER};
use crate::pipeline::training::metrics::EvaluationMetrics;

pub const CURRENT_POINTER: &str = "CURRENT";
pub const BUNDLES_DIR: &str = "bundles";
const SCALER_FILE: &str = "scaler.json";
const CLASSIFIER_FILE: &str = "classifier.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub model_version: String,
    pub feature_order: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub metrics: EvaluationMetrics,
    pub hyperparameters: Hyperparameters,
    pub train_rows: usize,
    pub test_rows: usize,
    pub rejected_rows: usize,
    pub scaler_sha256: String,
    pub classifier_sha256: String,
}

/// Training facts recorded alongside the fitted components.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub trained_at: DateTime<Utc>,
    pub metrics: EvaluationMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
    pub rejected_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    pub metadata: BundleMetadata,
    pub scaler: StandardScaler,
    pub classifier: GradientBoostedClassifier,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn new_version(trained_at: &DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", trained_at.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ModelError> {
    fs::write(path, bytes).map_err(|e| ModelError::io(path, e))
}

fn read_file(path: &Path) -> Result<Vec<u8>, ModelError> {
    fs::read(path).map_err(|e| ModelError::io(path, e))
}

/// Write a new bundle and make it the serving one.
pub fn save_bundle(
    root: &Path,
    scaler: &StandardScaler,
    classifier: &GradientBoostedClassifier,
    summary: TrainingSummary,
) -> Result<BundleMetadata, ModelError> {
    let bundles = root.join(BUNDLES_DIR);
    fs::create_dir_all(&bundles).map_err(|e| ModelError::io(&bundles, e))?;

    let scaler_bytes = serde_json::to_vec_pretty(scaler)?;
    let classifier_bytes = serde_json::to_vec(classifier)?;

    let metadata = BundleMetadata {
        model_version: new_version(&summary.trained_at),
        feature_order: feature_order_names(),
        trained_at: summary.trained_at,
        metrics: summary.metrics,
        hyperparameters: classifier.hyperparameters.clone(),
        train_rows: summary.train_rows,
        test_rows: summary.test_rows,
        rejected_rows: summary.rejected_rows,
        scaler_sha256: sha256_hex(&scaler_bytes),
        classifier_sha256: sha256_hex(&classifier_bytes),
    };

    let final_dir = bundles.join(&metadata.model_version);
    if final_dir.exists() {
        return Err(ModelError::VersionExists(metadata.model_version));
    }

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&bundles)
        .map_err(|e| ModelError::io(&bundles, e))?;
    write_file(&staging.path().join(SCALER_FILE), &scaler_bytes)?;
    write_file(&staging.path().join(CLASSIFIER_FILE), &classifier_bytes)?;
    write_file(
        &staging.path().join(METADATA_FILE),
        &serde_json::to_vec_pretty(&metadata)?,
    )?;

    // The staging guard's cleanup is a no-op once the directory has moved.
    fs::rename(staging.path(), &final_dir).map_err(|e| ModelError::io(&final_dir, e))?;

    publish_pointer(root, &metadata.model_version)?;

    tracing::info!(
        version = %metadata.model_version,
        accuracy = metadata.metrics.accuracy,
        f1 = metadata.metrics.f1,
        "Model bundle published"
    );
    Ok(metadata)
}

fn publish_pointer(root: &Path, version: &str) -> Result<(), ModelError> {
    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| ModelError::io(root, e))?;
    tmp.write_all(version.as_bytes())
        .map_err(|e| ModelError::io(tmp.path(), e))?;
    let pointer = root.join(CURRENT_POINTER);
    tmp.persist(&pointer)
        .map_err(|e| ModelError::io(&pointer, e.error))?;
    Ok(())
}

/// Version named by `CURRENT`, if any bundle has been published.
pub fn current_version(root: &Path) -> Result<Option<String>, ModelError> {
    let pointer = root.join(CURRENT_POINTER);
    match fs::read_to_string(&pointer) {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ModelError::io(pointer, e)),
    }
}

pub fn bundle_dir(root: &Path, version: &str) -> PathBuf {
    root.join(BUNDLES_DIR).join(version)
}

/// Load and verify the serving bundle.
pub fn load_current(root: &Path) -> Result<ArtifactBundle, ModelError> {
    let version = current_version(root)?.ok_or_else(|| ModelError::Missing(root.to_path_buf()))?;
    if version.is_empty() || version.contains(['/', '\\']) || version.starts_with('.') {
        return Err(ModelError::Corrupt(format!("invalid bundle pointer {version:?}")));
    }
    load_bundle(&bundle_dir(root, &version))
}

pub fn load_bundle(dir: &Path) -> Result<ArtifactBundle, ModelError> {
    if !dir.is_dir() {
        return Err(ModelError::Missing(dir.to_path_buf()));
    }
    let metadata: BundleMetadata = serde_json::from_slice(&read_file(&dir.join(METADATA_FILE))?)?;

    if metadata.feature_order != FEATURE_ORDER {
        return Err(ModelError::FeatureOrderMismatch {
            found: metadata.feature_order,
        });
    }

    let scaler_bytes = read_file(&dir.join(SCALER_FILE))?;
    if sha256_hex(&scaler_bytes) != metadata.scaler_sha256 {
        return Err(ModelError::ChecksumMismatch {
            file: SCALER_FILE.into(),
        });
    }
    let classifier_bytes = read_file(&dir.join(CLASSIFIER_FILE))?;
    if sha256_hex(&classifier_bytes) != metadata.classifier_sha256 {
        return Err(ModelError::ChecksumMismatch {
            file: CLASSIFIER_FILE.into(),
        });
    }

    let scaler: StandardScaler = serde_json::from_slice(&scaler_bytes)?;
    scaler.validate()?;
    let classifier: GradientBoostedClassifier = serde_json::from_slice(&classifier_bytes)?;
    classifier.validate()?;

    Ok(ArtifactBundle {
        metadata,
        scaler,
        classifier,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_summary() -> TrainingSummary {
        TrainingSummary {
            trained_at: Utc::now(),
            metrics: EvaluationMetrics {
                accuracy: 0.8,
                precision: 0.75,
                recall: 0.7,
                f1: 0.72,
            },
            train_rows: 8,
            test_rows: 2,
            rejected_rows: 0,
        }
    }

    /// Publish a tree-less bundle that always predicts `probability`.
    pub(crate) fn install_constant_bundle(root: &Path, probability: f64) -> BundleMetadata {
        save_bundle(
            root,
            &StandardScaler::identity(),
            &GradientBoostedClassifier::constant(probability),
            sample_summary(),
        )
        .unwrap()
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = install_constant_bundle(dir.path(), 0.3);

        let bundle = load_current(dir.path()).unwrap();
        assert_eq!(bundle.metadata, metadata);
        assert_eq!(bundle.scaler, StandardScaler::identity());
        assert_eq!(current_version(dir.path()).unwrap(), Some(metadata.model_version));
    }

    #[test]
    fn missing_bundle_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_current(dir.path()),
            Err(ModelError::Missing(_))
        ));
    }

    #[test]
    fn corrupted_classifier_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = install_constant_bundle(dir.path(), 0.3);
        let path = bundle_dir(dir.path(), &metadata.model_version).join(CLASSIFIER_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes.push(b' ');
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            load_current(dir.path()),
            Err(ModelError::ChecksumMismatch { file }) if file == CLASSIFIER_FILE
        ));
    }

    #[test]
    fn swapped_scaler_from_other_bundle_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = install_constant_bundle(dir.path(), 0.3);

        let other_scaler = StandardScaler {
            means: vec![1.0; crate::pipeline::features::FEATURE_COUNT],
            scales: vec![2.0; crate::pipeline::features::FEATURE_COUNT],
        };
        fs::write(
            bundle_dir(dir.path(), &first.model_version).join(SCALER_FILE),
            serde_json::to_vec_pretty(&other_scaler).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            load_current(dir.path()),
            Err(ModelError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn feature_order_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = install_constant_bundle(dir.path(), 0.3);
        let meta_path = bundle_dir(dir.path(), &metadata.model_version).join(METADATA_FILE);

        let mut tampered = metadata.clone();
        tampered.feature_order.swap(0, 1);
        fs::write(&meta_path, serde_json::to_vec(&tampered).unwrap()).unwrap();

        assert!(matches!(
            load_current(dir.path()),
            Err(ModelError::FeatureOrderMismatch { .. })
        ));
    }

    #[test]
    fn second_publish_moves_pointer_and_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        let first = install_constant_bundle(dir.path(), 0.3);
        let second = install_constant_bundle(dir.path(), 0.6);

        assert_ne!(first.model_version, second.model_version);
        assert_eq!(current_version(dir.path()).unwrap(), Some(second.model_version));
        assert!(bundle_dir(dir.path(), &first.model_version).is_dir());
    }

    #[test]
    fn no_staging_directories_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        install_constant_bundle(dir.path(), 0.3);
        let leftovers = fs::read_dir(dir.path().join(BUNDLES_DIR))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
