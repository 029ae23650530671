//! Admin-curated knowledge base and passage retrieval for grounded chat.

pub mod chunker;
pub mod embedder;
pub mod index;
pub mod ingest;

use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::authorization::{require_admin, AuthorizationError, RequestContext};
use crate::db::{self, DatabaseError};
use crate::models::KnowledgeDocument;

pub use embedder::{EmbeddingError, EmbeddingModel, HashedTermEmbedder};
pub use index::{KnowledgeBase, KnowledgeIndex};
pub use ingest::{IngestError, KnowledgeSource, NewKnowledgeDocument};

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Indexing failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Knowledge retrieval unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    pub score: f32,
}

/// Passage search over the knowledge base (allows mocking).
pub trait Retriever: Send + Sync {
    fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError>;
}

/// Store a new document and rebuild the index. Admin only.
pub fn add_document(
    conn: &Connection,
    knowledge: &KnowledgeBase,
    ctx: &RequestContext,
    new_doc: &NewKnowledgeDocument,
    fetch_timeout: Duration,
) -> Result<KnowledgeDocument, KnowledgeError> {
    require_admin(ctx, "add knowledge document")?;
    let doc = ingest::prepare_document(new_doc, &ctx.user_id, fetch_timeout)?;
    db::insert_knowledge_document(conn, &doc)?;
    tracing::info!(
        document_id = %doc.id,
        source_type = doc.source_type.as_str(),
        chars = doc.content.len(),
        "Knowledge document added"
    );
    knowledge.rebuild_from_db(conn)?;
    Ok(doc)
}

/// Remove a document and rebuild the index. Admin only.
pub fn delete_document(
    conn: &Connection,
    knowledge: &KnowledgeBase,
    ctx: &RequestContext,
    id: &Uuid,
) -> Result<(), KnowledgeError> {
    require_admin(ctx, "delete knowledge document")?;
    db::delete_knowledge_document(conn, id)?;
    tracing::info!(document_id = %id, "Knowledge document deleted");
    knowledge.rebuild_from_db(conn)?;
    Ok(())
}
