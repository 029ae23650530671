use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::assessment::AssessmentRecord;
use super::enums::{NarrativeSource, RiskLabel};

/// One assessment as it appears in a trend comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonVisit {
    pub assessment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub glucose: f64,
    pub blood_pressure: f64,
    pub bmi: f64,
    pub insulin: f64,
    pub label: RiskLabel,
    pub confidence_percent: f64,
}

impl From<&AssessmentRecord> for ComparisonVisit {
    fn from(record: &AssessmentRecord) -> Self {
        let m = record.observation.measurements();
        Self {
            assessment_id: record.assessment.id,
            created_at: record.assessment.created_at,
            glucose: m.glucose,
            blood_pressure: m.blood_pressure,
            bmi: m.bmi,
            insulin: m.insulin,
            label: record.assessment.label,
            confidence_percent: record.assessment.confidence_percent,
        }
    }
}

/// A current assessment compared against earlier ones of the same user.
/// `visits` runs oldest to newest and includes the current assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentComparison {
    pub id: Uuid,
    pub current_assessment_id: Uuid,
    pub owner_id: String,
    pub visits: Vec<ComparisonVisit>,
    pub narrative_text: String,
    pub narrative_source: NarrativeSource,
    pub chart_ref: PathBuf,
    pub generated_at: DateTime<Utc>,
}
