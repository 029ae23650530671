//! Immutable index snapshots and the swap-on-rebuild knowledge base.
//!
//! Readers clone the current `Arc<KnowledgeIndex>` under a read lock and
//! search it without holding any lock. A rebuild builds a complete new
//! snapshot outside the lock and swaps it in, so a reader always sees one
//! whole index, old or new.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::chunker::{Chunker, SlidingWindowChunker};
use super::embedder::{cosine_similarity, EmbeddingModel};
use super::{KnowledgeError, RetrievalError, RetrievedPassage, Retriever};
use crate::db;
use crate::models::KnowledgeDocument;

/// Passages scoring at or below this are treated as unrelated.
pub const MIN_RELEVANCE: f32 = 0.05;

struct IndexedChunk {
    document_id: Uuid,
    title: String,
    content: String,
    embedding: Vec<f32>,
}

pub struct KnowledgeIndex {
    chunks: Vec<IndexedChunk>,
    document_count: usize,
    built_at: DateTime<Utc>,
}

impl KnowledgeIndex {
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            document_count: 0,
            built_at: Utc::now(),
        }
    }

    pub fn build(
        documents: &[KnowledgeDocument],
        chunker: &dyn Chunker,
        embedder: &dyn EmbeddingModel,
    ) -> Result<Self, KnowledgeError> {
        let mut chunks = Vec::new();
        for doc in documents {
            let pieces = chunker.chunk(&doc.content);
            let texts: Vec<&str> = pieces.iter().map(|c| c.content.as_str()).collect();
            let embeddings = embedder.embed_batch(&texts)?;
            for (piece, embedding) in pieces.into_iter().zip(embeddings) {
                chunks.push(IndexedChunk {
                    document_id: doc.id,
                    title: doc.title.clone(),
                    content: piece.content,
                    embedding,
                });
            }
        }
        Ok(Self {
            chunks,
            document_count: documents.len(),
            built_at: Utc::now(),
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn contains_document(&self, id: &Uuid) -> bool {
        self.chunks.iter().any(|c| c.document_id == *id)
    }

    /// Top `top_k` chunks by cosine similarity above `MIN_RELEVANCE`.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<RetrievedPassage> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(query_embedding, &chunk.embedding), chunk))
            .filter(|(score, _)| *score > MIN_RELEVANCE)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| RetrievedPassage {
                document_id: chunk.document_id,
                title: chunk.title.clone(),
                content: chunk.content.clone(),
                score,
            })
            .collect()
    }
}

pub struct KnowledgeBase {
    current: RwLock<Arc<KnowledgeIndex>>,
    rebuild_lock: Mutex<()>,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self::with_chunker(Box::new(SlidingWindowChunker::default()), embedder)
    }

    pub fn with_chunker(chunker: Box<dyn Chunker>, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            current: RwLock::new(Arc::new(KnowledgeIndex::empty())),
            rebuild_lock: Mutex::new(()),
            chunker,
            embedder,
        }
    }

    /// The index as of now. Holding it does not block rebuilds.
    pub fn snapshot(&self) -> Arc<KnowledgeIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Build a fresh snapshot from `documents` and publish it.
    pub fn rebuild(&self, documents: &[KnowledgeDocument]) -> Result<Arc<KnowledgeIndex>, KnowledgeError> {
        let _serialized = self.rebuild_lock.lock().unwrap_or_else(|e| e.into_inner());

        let index = Arc::new(KnowledgeIndex::build(
            documents,
            self.chunker.as_ref(),
            self.embedder.as_ref(),
        )?);

        {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = Arc::clone(&index);
        }

        tracing::info!(
            documents = index.document_count(),
            chunks = index.chunk_count(),
            built_at = %index.built_at(),
            "Knowledge index rebuilt"
        );
        Ok(index)
    }

    /// Rebuild from every stored document.
    pub fn rebuild_from_db(&self, conn: &Connection) -> Result<Arc<KnowledgeIndex>, KnowledgeError> {
        let documents = db::list_knowledge_documents(conn)?;
        self.rebuild(&documents)
    }
}

impl Retriever for KnowledgeBase {
    fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let query = self
            .embedder
            .embed(question)
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;
        Ok(self.snapshot().search(&query, top_k))
    }
}
