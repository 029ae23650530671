use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{NarrativeSource, ReportFormat};

/// The single canonical record of a generated report. One per assessment;
/// regeneration replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub assessment_id: Uuid,
    pub narrative_text: String,
    pub narrative_source: NarrativeSource,
    pub chart_refs: Vec<PathBuf>,
    pub document_ref: PathBuf,
    pub format: ReportFormat,
    pub generated_at: DateTime<Utc>,
}
