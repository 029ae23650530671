//! Offline training run.
//!
//! `Ingested → Transformed → Trained → Evaluated → Serialized`. Each stage is
//! its own type, so a later stage cannot run on data that skipped an earlier
//! one. A run that misses the acceptance thresholds stops before anything is
//! written and the previously published bundle keeps serving.

pub mod dataset;
pub mod metrics;

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::config::TrainingSettings;
use crate::pipeline::features::{feature_vector, FEATURE_COUNT};
use crate::pipeline::model::artifact::{save_bundle, TrainingSummary};
use crate::pipeline::model::{
    BundleMetadata, GradientBoostedClassifier, Hyperparameters, ModelError, StandardScaler,
};
use dataset::{stratified_split, Dataset, LabeledObservation};
use metrics::EvaluationMetrics;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset contains no usable rows")]
    EmptyDataset,

    #[error("Split left an empty {0} set")]
    EmptySplit(&'static str),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Model rejected, previous bundle kept: {}", .failures.join(", "))]
    Acceptance {
        metrics: EvaluationMetrics,
        failures: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    Ingested,
    Transformed,
    Trained,
    Evaluated,
    Serialized,
}

impl TrainingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingested => "ingested",
            Self::Transformed => "transformed",
            Self::Trained => "trained",
            Self::Evaluated => "evaluated",
            Self::Serialized => "serialized",
        }
    }
}

fn enter(stage: TrainingStage) {
    tracing::info!(stage = stage.as_str(), "Training stage reached");
}

// ── Stages ──

pub struct Ingested {
    dataset: Dataset,
}

pub struct Transformed {
    scaler: StandardScaler,
    train_x: Vec<[f64; FEATURE_COUNT]>,
    train_y: Vec<f64>,
    test_x: Vec<[f64; FEATURE_COUNT]>,
    test_y: Vec<bool>,
    rejected: usize,
}

pub struct Trained {
    data: Transformed,
    classifier: GradientBoostedClassifier,
}

pub struct Evaluated {
    trained: Trained,
    metrics: EvaluationMetrics,
}

pub fn ingest(path: &Path) -> Result<Ingested, TrainingError> {
    let dataset = dataset::load_dataset(path)?;
    Ok(Ingested::from_dataset(dataset))
}

impl Ingested {
    pub fn from_dataset(dataset: Dataset) -> Self {
        enter(TrainingStage::Ingested);
        tracing::info!(
            rows = dataset.rows.len(),
            rejected = dataset.rejected,
            "Dataset ingested"
        );
        Self { dataset }
    }

    /// Split, then fit the scaler on the training rows only.
    pub fn transform(self, settings: &TrainingSettings) -> Result<Transformed, TrainingError> {
        let (train, test) =
            stratified_split(self.dataset.rows, settings.test_fraction, settings.seed);
        if train.is_empty() {
            return Err(TrainingError::EmptySplit("training"));
        }
        if test.is_empty() {
            return Err(TrainingError::EmptySplit("test"));
        }

        let raw_train: Vec<[f64; FEATURE_COUNT]> = features(&train);
        let scaler = StandardScaler::fit(&raw_train)?;
        let train_x = raw_train.iter().map(|r| scaler.transform(r)).collect();
        let test_x = features(&test).iter().map(|r| scaler.transform(r)).collect();

        enter(TrainingStage::Transformed);
        Ok(Transformed {
            scaler,
            train_x,
            train_y: train.iter().map(|r| if r.diabetic { 1.0 } else { 0.0 }).collect(),
            test_x,
            test_y: test.iter().map(|r| r.diabetic).collect(),
            rejected: self.dataset.rejected,
        })
    }
}

fn features(rows: &[LabeledObservation]) -> Vec<[f64; FEATURE_COUNT]> {
    rows.iter().map(|r| feature_vector(&r.observation)).collect()
}

impl Transformed {
    pub fn train(self, hyperparameters: Hyperparameters) -> Result<Trained, TrainingError> {
        let classifier = GradientBoostedClassifier::fit(&self.train_x, &self.train_y, hyperparameters)?;
        enter(TrainingStage::Trained);
        Ok(Trained {
            data: self,
            classifier,
        })
    }
}

impl Trained {
    pub fn evaluate(self) -> Evaluated {
        let predicted: Vec<bool> = self
            .data
            .test_x
            .iter()
            .map(|x| self.classifier.predict_proba(x) >= crate::models::DIABETIC_THRESHOLD)
            .collect();
        let metrics = EvaluationMetrics::compute(&predicted, &self.data.test_y);

        enter(TrainingStage::Evaluated);
        tracing::info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            "Held-out evaluation"
        );
        Evaluated {
            trained: self,
            metrics,
        }
    }
}

impl Evaluated {
    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metrics
    }

    /// Check acceptance, then publish the bundle under `model_root`.
    pub fn serialize(
        self,
        model_root: &Path,
        settings: &TrainingSettings,
    ) -> Result<BundleMetadata, TrainingError> {
        let failures = self.metrics.shortfalls(settings);
        if !failures.is_empty() {
            tracing::warn!(failures = ?failures, "Model below acceptance thresholds");
            return Err(TrainingError::Acceptance {
                metrics: self.metrics,
                failures,
            });
        }

        let data = &self.trained.data;
        let metadata = save_bundle(
            model_root,
            &data.scaler,
            &self.trained.classifier,
            TrainingSummary {
                trained_at: Utc::now(),
                metrics: self.metrics,
                train_rows: data.train_x.len(),
                test_rows: data.test_x.len(),
                rejected_rows: data.rejected,
            },
        )?;
        enter(TrainingStage::Serialized);
        Ok(metadata)
    }
}

/// Full run from a CSV file to a published bundle.
pub fn run_training(
    dataset_path: &Path,
    model_root: &Path,
    settings: &TrainingSettings,
) -> Result<BundleMetadata, TrainingError> {
    ingest(dataset_path)?
        .transform(settings)?
        .train(Hyperparameters::default())?
        .evaluate()
        .serialize(model_root, settings)
}
