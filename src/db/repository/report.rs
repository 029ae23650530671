use std::path::PathBuf;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

/// Insert or replace the single report row for an assessment.
pub fn upsert_report(conn: &Connection, report: &ReportArtifact) -> Result<(), DatabaseError> {
    let chart_refs = serde_json::to_string(&report.chart_refs)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("chart refs encoding: {e}")))?;
    conn.execute(
        "INSERT INTO report_artifacts (assessment_id, narrative_text, narrative_source,
         chart_refs, document_ref, format, generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(assessment_id) DO UPDATE SET
            narrative_text = excluded.narrative_text,
            narrative_source = excluded.narrative_source,
            chart_refs = excluded.chart_refs,
            document_ref = excluded.document_ref,
            format = excluded.format,
            generated_at = excluded.generated_at",
        params![
            report.assessment_id.to_string(),
            report.narrative_text,
            report.narrative_source.as_str(),
            chart_refs,
            report.document_ref.to_string_lossy(),
            report.format.as_str(),
            format_timestamp(&report.generated_at),
        ],
    )?;
    Ok(())
}

pub fn get_report(
    conn: &Connection,
    assessment_id: &Uuid,
) -> Result<Option<ReportArtifact>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT assessment_id, narrative_text, narrative_source, chart_refs, document_ref,
                    format, generated_at
             FROM report_artifacts WHERE assessment_id = ?1",
            params![assessment_id.to_string()],
            |row| {
                Ok(ReportRow {
                    assessment_id: row.get(0)?,
                    narrative_text: row.get(1)?,
                    narrative_source: row.get(2)?,
                    chart_refs: row.get(3)?,
                    document_ref: row.get(4)?,
                    format: row.get(5)?,
                    generated_at: row.get(6)?,
                })
            },
        )
        .optional()?;

    row.map(report_from_row).transpose()
}

pub fn count_reports(conn: &Connection, assessment_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM report_artifacts WHERE assessment_id = ?1",
        params![assessment_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct ReportRow {
    assessment_id: String,
    narrative_text: String,
    narrative_source: String,
    chart_refs: String,
    document_ref: String,
    format: String,
    generated_at: String,
}

fn report_from_row(row: ReportRow) -> Result<ReportArtifact, DatabaseError> {
    let chart_refs: Vec<PathBuf> =
        serde_json::from_str(&row.chart_refs).map_err(|e| DatabaseError::InvalidValue {
            field: "chart_refs".into(),
            reason: e.to_string(),
        })?;

    Ok(ReportArtifact {
        assessment_id: parse_uuid("assessment_id", &row.assessment_id)?,
        narrative_text: row.narrative_text,
        narrative_source: NarrativeSource::from_str(&row.narrative_source)?,
        chart_refs,
        document_ref: PathBuf::from(row.document_ref),
        format: ReportFormat::from_str(&row.format)?,
        generated_at: parse_timestamp("generated_at", &row.generated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_assessment;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::features::tests::sample_observation;
    use chrono::{Duration, Utc};

    fn seeded_assessment(conn: &Connection) -> Uuid {
        let assessment = RiskAssessment {
            id: Uuid::new_v4(),
            probability: 0.82,
            label: RiskLabel::Diabetic,
            confidence_percent: 82.0,
            model_version: "test".into(),
            created_at: Utc::now(),
            requested_by: "user".into(),
        };
        insert_assessment(conn, &assessment, &sample_observation()).unwrap();
        assessment.id
    }

    fn make_report(assessment_id: Uuid, narrative: &str) -> ReportArtifact {
        ReportArtifact {
            assessment_id,
            narrative_text: narrative.into(),
            narrative_source: NarrativeSource::Fallback,
            chart_refs: vec![PathBuf::from("/r/bar.png"), PathBuf::from("/r/pie.png")],
            document_ref: PathBuf::from("/r/report.pdf"),
            format: ReportFormat::Pdf,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_then_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let id = seeded_assessment(&conn);
        let report = make_report(id, "first");
        upsert_report(&conn, &report).unwrap();

        assert_eq!(get_report(&conn, &id).unwrap(), Some(report));
    }

    #[test]
    fn regeneration_replaces_single_row() {
        let conn = open_memory_database().unwrap();
        let id = seeded_assessment(&conn);
        upsert_report(&conn, &make_report(id, "first")).unwrap();

        let mut second = make_report(id, "second");
        second.generated_at = Utc::now() + Duration::seconds(5);
        upsert_report(&conn, &second).unwrap();

        assert_eq!(count_reports(&conn, &id).unwrap(), 1);
        let stored = get_report(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.narrative_text, "second");
    }

    #[test]
    fn report_requires_existing_assessment() {
        let conn = open_memory_database().unwrap();
        let result = upsert_report(&conn, &make_report(Uuid::new_v4(), "orphan"));
        assert!(result.is_err());
    }
}
