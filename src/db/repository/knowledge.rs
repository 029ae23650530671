use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_knowledge_document(
    conn: &Connection,
    doc: &KnowledgeDocument,
) -> Result<(), DatabaseError> {
    if doc.content.trim().is_empty() {
        return Err(DatabaseError::ConstraintViolation(
            "knowledge document content must not be empty".into(),
        ));
    }
    conn.execute(
        "INSERT INTO knowledge_documents (id, title, source_type, source_ref, content,
         uploaded_at, uploaded_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            doc.id.to_string(),
            doc.title,
            doc.source_type.as_str(),
            doc.source_ref,
            doc.content,
            format_timestamp(&doc.uploaded_at),
            doc.uploaded_by,
        ],
    )?;
    Ok(())
}

/// Returns `NotFound` when no row matched.
pub fn delete_knowledge_document(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM knowledge_documents WHERE id = ?1",
        params![id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "KnowledgeDocument".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_knowledge_document(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<KnowledgeDocument>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(document_from_row).transpose()
}

/// All documents in upload order.
pub fn list_knowledge_documents(conn: &Connection) -> Result<Vec<KnowledgeDocument>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY uploaded_at ASC, id ASC"))?;
    let rows = stmt.query_map([], read_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

const SELECT_COLUMNS: &str = "SELECT id, title, source_type, source_ref, content, uploaded_at,
    uploaded_by FROM knowledge_documents";

struct DocumentRow {
    id: String,
    title: String,
    source_type: String,
    source_ref: Option<String>,
    content: String,
    uploaded_at: String,
    uploaded_by: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        source_type: row.get(2)?,
        source_ref: row.get(3)?,
        content: row.get(4)?,
        uploaded_at: row.get(5)?,
        uploaded_by: row.get(6)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<KnowledgeDocument, DatabaseError> {
    Ok(KnowledgeDocument {
        id: parse_uuid("id", &row.id)?,
        title: row.title,
        source_type: KnowledgeSourceType::from_str(&row.source_type)?,
        source_ref: row.source_ref,
        content: row.content,
        uploaded_at: parse_timestamp("uploaded_at", &row.uploaded_at)?,
        uploaded_by: row.uploaded_by,
    })
}
