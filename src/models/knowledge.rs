use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::KnowledgeSourceType;

/// Admin-curated reference text that grounds chatbot answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: Uuid,
    pub title: String,
    pub source_type: KnowledgeSourceType,
    /// File name or URL the content came from.
    pub source_ref: Option<String>,
    pub content: String,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}
