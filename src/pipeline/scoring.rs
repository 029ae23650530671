//! Risk scoring against the serving artifact bundle.
//!
//! The scorer is loaded once and shared as `Arc<RiskScorer>`; it has no
//! interior mutability, so concurrent requests need no locking.

use std::path::Path;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{AuditEntry, ClinicalObservation, RiskAssessment, RiskLabel};
use crate::pipeline::features::feature_vector;
use crate::pipeline::model::artifact::{load_current, ArtifactBundle};
use crate::pipeline::model::{GradientBoostedClassifier, ModelError, StandardScaler};

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Risk model unavailable: {0}")]
    ModelUnavailable(#[from] ModelError),

    #[error("Could not record assessment: {0}")]
    Persistence(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub probability: f64,
    pub label: RiskLabel,
    pub confidence_percent: f64,
}

/// `round(max(p, 1 - p) × 100)`.
pub fn confidence_percent(probability: f64) -> f64 {
    (probability.max(1.0 - probability) * 100.0).round()
}

/// Where a finished assessment and its audit record are written.
pub trait AssessmentSink {
    fn record(
        &self,
        assessment: &RiskAssessment,
        observation: &ClinicalObservation,
        audit: &AuditEntry,
    ) -> Result<(), DatabaseError>;
}

/// Writes the assessment and its audit entry in one transaction.
pub struct SqliteAssessmentSink<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAssessmentSink<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AssessmentSink for SqliteAssessmentSink<'_> {
    fn record(
        &self,
        assessment: &RiskAssessment,
        observation: &ClinicalObservation,
        audit: &AuditEntry,
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        db::insert_assessment(&tx, assessment, observation)?;
        db::insert_audit_entry(&tx, audit)?;
        tx.commit()?;
        Ok(())
    }
}

pub struct RiskScorer {
    scaler: StandardScaler,
    classifier: GradientBoostedClassifier,
    model_version: String,
}

impl RiskScorer {
    /// Load and verify the serving bundle under `model_root`.
    pub fn load(model_root: &Path) -> Result<Self, ScoringError> {
        let bundle = load_current(model_root)?;
        tracing::info!(
            version = %bundle.metadata.model_version,
            trees = bundle.classifier.trees.len(),
            "Risk model loaded"
        );
        Ok(Self::from_bundle(bundle))
    }

    pub fn from_bundle(bundle: ArtifactBundle) -> Self {
        Self {
            scaler: bundle.scaler,
            classifier: bundle.classifier,
            model_version: bundle.metadata.model_version,
        }
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn score(&self, observation: &ClinicalObservation) -> ScoreResult {
        let scaled = self.scaler.transform(&feature_vector(observation));
        let probability = self.classifier.predict_proba(&scaled).clamp(0.0, 1.0);
        ScoreResult {
            probability,
            label: RiskLabel::from_probability(probability),
            confidence_percent: confidence_percent(probability),
        }
    }

    /// Score, stamp, and record one assessment with its audit entry.
    pub fn assess(
        &self,
        observation: &ClinicalObservation,
        requested_by: &str,
        sink: &dyn AssessmentSink,
    ) -> Result<RiskAssessment, ScoringError> {
        let result = self.score(observation);
        let now = Utc::now();
        let assessment = RiskAssessment {
            id: Uuid::new_v4(),
            probability: result.probability,
            label: result.label,
            confidence_percent: result.confidence_percent,
            model_version: self.model_version.clone(),
            created_at: now,
            requested_by: requested_by.to_string(),
        };
        let audit = AuditEntry {
            timestamp: now,
            user_id: requested_by.to_string(),
            action: "risk_assessment".into(),
            entity_type: "assessment".into(),
            entity_id: assessment.id.to_string(),
        };
        sink.record(&assessment, observation, &audit)?;

        tracing::info!(
            assessment_id = %assessment.id,
            label = assessment.label.as_str(),
            confidence = assessment.confidence_percent,
            "Risk assessment recorded"
        );
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::features::tests::sample_observation;
    use crate::pipeline::model::artifact::tests::install_constant_bundle;
    use std::sync::Arc;

    fn scorer_with_probability(p: f64) -> (tempfile::TempDir, RiskScorer) {
        let dir = tempfile::tempdir().unwrap();
        install_constant_bundle(dir.path(), p);
        let scorer = RiskScorer::load(dir.path()).unwrap();
        (dir, scorer)
    }

    #[test]
    fn scores_fixed_probability() {
        let (_dir, scorer) = scorer_with_probability(0.82);
        let result = scorer.score(&sample_observation());
        assert!((result.probability - 0.82).abs() < 1e-9);
        assert_eq!(result.label, RiskLabel::Diabetic);
        assert_eq!(result.confidence_percent, 82.0);
    }

    #[test]
    fn exact_half_is_diabetic() {
        let (_dir, scorer) = scorer_with_probability(0.5);
        let result = scorer.score(&sample_observation());
        assert_eq!(result.probability, 0.5);
        assert_eq!(result.label, RiskLabel::Diabetic);
        assert_eq!(result.confidence_percent, 50.0);
    }

    #[test]
    fn low_probability_confidence_uses_complement() {
        let (_dir, scorer) = scorer_with_probability(0.1);
        let result = scorer.score(&sample_observation());
        assert_eq!(result.label, RiskLabel::NonDiabetic);
        assert_eq!(result.confidence_percent, 90.0);
    }

    #[test]
    fn missing_bundle_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RiskScorer::load(dir.path()),
            Err(ScoringError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn assess_writes_assessment_and_audit() {
        let (_dir, scorer) = scorer_with_probability(0.82);
        let conn = open_memory_database().unwrap();
        let observation = sample_observation();

        let assessment = scorer
            .assess(&observation, "alice", &SqliteAssessmentSink::new(&conn))
            .unwrap();

        let stored = db::get_assessment(&conn, &assessment.id).unwrap().unwrap();
        assert_eq!(stored.assessment, assessment);
        assert_eq!(stored.observation, observation);

        let audit = db::query_audit_by_user(&conn, "alice").unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].entity_id, assessment.id.to_string());
    }

    #[test]
    fn shared_scorer_is_consistent_across_threads() {
        let (_dir, scorer) = scorer_with_probability(0.67);
        let scorer = Arc::new(scorer);
        let observation = sample_observation();
        let expected = scorer.score(&observation);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let scorer = Arc::clone(&scorer);
                    s.spawn(move || {
                        (0..50).map(|_| scorer.score(&observation)).collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                for result in handle.join().unwrap() {
                    assert_eq!(result, expected);
                }
            }
        });
    }
}
