use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

/// Persist an assessment and the observation it was scored from.
pub fn insert_assessment(
    conn: &Connection,
    assessment: &RiskAssessment,
    observation: &ClinicalObservation,
) -> Result<(), DatabaseError> {
    let observation_json = serde_json::to_string(observation)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("observation encoding: {e}")))?;
    conn.execute(
        "INSERT INTO assessments (id, requested_by, observation_json, probability, label,
         confidence_percent, model_version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            assessment.id.to_string(),
            assessment.requested_by,
            observation_json,
            assessment.probability,
            assessment.label.as_str(),
            assessment.confidence_percent,
            assessment.model_version,
            format_timestamp(&assessment.created_at),
        ],
    )?;
    Ok(())
}

const SELECT_COLUMNS: &str = "SELECT id, requested_by, observation_json, probability, label,
    confidence_percent, model_version, created_at FROM assessments";

pub fn get_assessment(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<AssessmentRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;

    row.map(record_from_row).transpose()
}

/// Most recent first.
pub fn list_assessments_by_user(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<AssessmentRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE requested_by = ?1 ORDER BY created_at DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![user_id, limit as i64], read_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

/// Counts over one user's assessments, or over everyone's when `user_id` is `None`.
pub fn assessment_statistics(
    conn: &Connection,
    user_id: Option<&str>,
) -> Result<AssessmentStatistics, DatabaseError> {
    let (total, diabetic, mean): (i64, i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN label = 'diabetic' THEN 1 ELSE 0 END), 0),
                AVG(probability)
         FROM assessments
         WHERE ?1 IS NULL OR requested_by = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    Ok(AssessmentStatistics {
        total: total as u64,
        diabetic: diabetic as u64,
        non_diabetic: (total - diabetic) as u64,
        mean_probability: mean,
    })
}

struct AssessmentRow {
    id: String,
    requested_by: String,
    observation_json: String,
    probability: f64,
    label: String,
    confidence_percent: f64,
    model_version: String,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssessmentRow> {
    Ok(AssessmentRow {
        id: row.get(0)?,
        requested_by: row.get(1)?,
        observation_json: row.get(2)?,
        probability: row.get(3)?,
        label: row.get(4)?,
        confidence_percent: row.get(5)?,
        model_version: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn record_from_row(row: AssessmentRow) -> Result<AssessmentRecord, DatabaseError> {
    let observation: ClinicalObservation =
        serde_json::from_str(&row.observation_json).map_err(|e| DatabaseError::InvalidValue {
            field: "observation_json".into(),
            reason: e.to_string(),
        })?;

    Ok(AssessmentRecord {
        assessment: RiskAssessment {
            id: parse_uuid("id", &row.id)?,
            probability: row.probability,
            label: RiskLabel::from_str(&row.label)?,
            confidence_percent: row.confidence_percent,
            model_version: row.model_version,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            requested_by: row.requested_by,
        },
        observation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::features::tests::sample_observation;
    use chrono::{Duration, Utc};

    fn make_assessment(user: &str, probability: f64) -> RiskAssessment {
        RiskAssessment {
            id: Uuid::new_v4(),
            probability,
            label: RiskLabel::from_probability(probability),
            confidence_percent: (probability.max(1.0 - probability) * 100.0).round(),
            model_version: "test-v1".into(),
            created_at: Utc::now(),
            requested_by: user.into(),
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let assessment = make_assessment("user-1", 0.82);
        let observation = sample_observation();
        insert_assessment(&conn, &assessment, &observation).unwrap();

        let record = get_assessment(&conn, &assessment.id).unwrap().unwrap();
        assert_eq!(record.assessment, assessment);
        assert_eq!(record.observation, observation);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_assessment(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn assessments_are_append_only() {
        let conn = open_memory_database().unwrap();
        let assessment = make_assessment("user-1", 0.3);
        insert_assessment(&conn, &assessment, &sample_observation()).unwrap();

        let result = conn.execute(
            "UPDATE assessments SET probability = 0.9 WHERE id = ?1",
            params![assessment.id.to_string()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn list_by_user_is_newest_first_and_scoped() {
        let conn = open_memory_database().unwrap();
        let mut older = make_assessment("alice", 0.2);
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = make_assessment("alice", 0.7);
        let other = make_assessment("bob", 0.9);
        for a in [&older, &newer, &other] {
            insert_assessment(&conn, a, &sample_observation()).unwrap();
        }

        let listed = list_assessments_by_user(&conn, "alice", 10).unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|r| r.assessment.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn statistics_count_labels() {
        let conn = open_memory_database().unwrap();
        for p in [0.1, 0.5, 0.9] {
            insert_assessment(&conn, &make_assessment("u", p), &sample_observation()).unwrap();
        }
        let stats = assessment_statistics(&conn, None).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.diabetic, 2);
        assert_eq!(stats.non_diabetic, 1);
        assert!((stats.mean_probability.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn statistics_on_empty_history() {
        let conn = open_memory_database().unwrap();
        let stats = assessment_statistics(&conn, None).unwrap();
        assert_eq!(stats, AssessmentStatistics::default());
    }

    #[test]
    fn statistics_scoped_to_one_user() {
        let conn = open_memory_database().unwrap();
        for (user, p) in [("alice", 0.9), ("alice", 0.2), ("bob", 0.8)] {
            insert_assessment(&conn, &make_assessment(user, p), &sample_observation()).unwrap();
        }

        let alice = assessment_statistics(&conn, Some("alice")).unwrap();
        assert_eq!((alice.total, alice.diabetic, alice.non_diabetic), (2, 1, 1));

        let carol = assessment_statistics(&conn, Some("carol")).unwrap();
        assert_eq!(carol, AssessmentStatistics::default());

        assert_eq!(assessment_statistics(&conn, None).unwrap().total, 3);
    }
}
