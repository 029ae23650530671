use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_chat_turn(conn: &Connection, turn: &ChatTurn) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_turns (user_id, question, answer, route, degraded, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            turn.user_id,
            turn.question,
            turn.answer,
            turn.route.as_str(),
            turn.degraded,
            format_timestamp(&turn.created_at),
        ],
    )?;
    Ok(())
}

/// The last `limit` turns for a user, oldest first (prompt order).
pub fn recent_chat_turns(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<ChatTurn>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, question, answer, route, degraded, created_at FROM chat_turns
         WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut turns = rows
        .into_iter()
        .map(|(user_id, question, answer, route, degraded, created_at)| {
            Ok(ChatTurn {
                user_id,
                question,
                answer,
                route: ChatRoute::from_str(&route)?,
                degraded,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;
    turns.reverse();
    Ok(turns)
}
