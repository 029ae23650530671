use rusqlite::{params, Connection};

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::AuditEntry;

pub fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (timestamp, user_id, action, entity_type, entity_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            format_timestamp(&entry.timestamp),
            entry.user_id,
            entry.action,
            entry.entity_type,
            entry.entity_id,
        ],
    )?;
    Ok(())
}

/// Entries for one user, newest first.
pub fn query_audit_by_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, user_id, action, entity_type, entity_id FROM audit_log
         WHERE user_id = ?1
         ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(timestamp, user_id, action, entity_type, entity_id)| {
            Ok(AuditEntry {
                timestamp: parse_timestamp("timestamp", &timestamp)?,
                user_id,
                action,
                entity_type,
                entity_id,
            })
        })
        .collect()
}
