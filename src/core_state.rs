//! Composition root: shared handles and the request operations.
//!
//! `CoreServices` is built once at startup and shared by reference (or
//! `Arc`) across request threads. Everything it holds is immutable or
//! internally synchronized; SQLite connections are opened per operation.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::authorization::{require_owner_or_admin, AuthorizationError, RequestContext};
use crate::chat::{ChatAnswer, ChatError, ChatService};
use crate::config::Settings;
use crate::db::{self, DatabaseError};
use crate::models::{
    AssessmentComparison, AssessmentRecord, AssessmentStatistics, AuditEntry, ChartKind,
    ClinicalObservation, ComparisonVisit, KnowledgeDocument, ReportArtifact, ReportFormat,
    RiskAssessment,
};
use crate::pipeline::charts::trend::render_trend;
use crate::pipeline::charts::{persist_charts, render_charts, ChartError};
use crate::pipeline::features::{validate_observation, RawObservation, ValidationError};
use crate::pipeline::knowledge::chunker::SlidingWindowChunker;
use crate::pipeline::knowledge::{
    self, HashedTermEmbedder, KnowledgeBase, KnowledgeError, NewKnowledgeDocument,
};
use crate::pipeline::narrative::{
    ChatCompletionClient, LlmClient, Narrative, NarrativeSynthesizer, ServiceError,
};
use crate::pipeline::report::{
    assemble, render_pdf, AssemblyError, PdfError, ReportInput, ReportStore, StoreError,
};
use crate::pipeline::scoring::{RiskScorer, ScoringError, SqliteAssessmentSink};

/// Upper bound on history rows returned in one call.
pub const MAX_HISTORY: usize = 100;

/// How many earlier assessments a comparison takes.
pub const COMPARISON_PAST_RANGE: RangeInclusive<usize> = 2..=3;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Risk model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),

    #[error("Assessment {0} not found")]
    AssessmentNotFound(Uuid),

    #[error("No report generated yet for assessment {0}")]
    ReportNotFound(Uuid),

    #[error("Invalid comparison: {0}")]
    InvalidComparison(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Chart rendering failed: {0}")]
    Chart(#[from] ChartError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Report rendering failed: {0}")]
    Pdf(#[from] PdfError),

    #[error("Report storage failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("LLM client setup failed: {0}")]
    LlmSetup(#[from] ServiceError),
}

impl From<ScoringError> for CoreError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::ModelUnavailable(inner) => Self::ModelUnavailable(inner.to_string()),
            ScoringError::Persistence(inner) => Self::Database(inner),
        }
    }
}

impl CoreError {
    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => {
                let issues: Vec<String> = e.issues.iter().map(ToString::to_string).collect();
                format!("Please check your input: {}", issues.join("; "))
            }
            Self::ModelUnavailable(_) => "Risk scoring is temporarily unavailable. Please try \
                again later; your data has not been lost."
                .into(),
            Self::Forbidden(_) | Self::Knowledge(KnowledgeError::Forbidden(_)) => {
                "You do not have permission to do that.".into()
            }
            Self::AssessmentNotFound(_) => "That assessment could not be found.".into(),
            Self::ReportNotFound(_) => {
                "No report has been generated for this assessment yet.".into()
            }
            Self::InvalidComparison(reason) => {
                format!("These assessments cannot be compared: {reason}.")
            }
            Self::Knowledge(KnowledgeError::Ingest(e)) => {
                format!("The document could not be added: {e}")
            }
            Self::Chat(ChatError::EmptyQuestion) => "Please type a question.".into(),
            _ => "Something went wrong on our side. Please try again later.".into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// CoreServices
// ═══════════════════════════════════════════════════════════

pub struct CoreServices {
    settings: Settings,
    db_path: PathBuf,
    /// `None` when no valid bundle could be loaded; scoring then degrades.
    scorer: Option<Arc<RiskScorer>>,
    synthesizer: NarrativeSynthesizer,
    knowledge: Arc<KnowledgeBase>,
    store: ReportStore,
}

impl CoreServices {
    /// Production wiring from settings. A missing model is not fatal.
    pub fn open(settings: Settings) -> Result<Self, CoreError> {
        let scorer = match RiskScorer::load(&settings.paths.model_dir()) {
            Ok(scorer) => Some(Arc::new(scorer)),
            Err(e) => {
                tracing::warn!(error = %e, "Starting without a risk model; scoring disabled");
                None
            }
        };
        let client = ChatCompletionClient::new(&settings.llm)?;
        if !client.is_configured() {
            tracing::warn!("No LLM API key configured; narratives will use fallback text");
        }
        let chunker = SlidingWindowChunker::new(
            settings.chat.chunk_chars,
            settings.chat.chunk_overlap_chars,
        );
        let knowledge = Arc::new(KnowledgeBase::with_chunker(
            Box::new(chunker),
            Arc::new(HashedTermEmbedder::default()),
        ));
        Self::with_components(settings, scorer, Arc::new(client), knowledge)
    }

    /// Wire explicit components. Rebuilds the knowledge index from storage.
    pub fn with_components(
        settings: Settings,
        scorer: Option<Arc<RiskScorer>>,
        llm: Arc<dyn LlmClient>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Result<Self, CoreError> {
        let db_path = settings.paths.database_path();
        let conn = db::open_database(&db_path)?;
        knowledge.rebuild_from_db(&conn)?;

        let services = Self {
            synthesizer: NarrativeSynthesizer::new(llm, &settings.llm),
            store: ReportStore::new(settings.paths.reports_dir()),
            db_path,
            scorer,
            knowledge,
            settings,
        };
        tracing::info!(
            db = %services.db_path.display(),
            model = services.model_version().unwrap_or("none"),
            "Core services ready"
        );
        Ok(services)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn model_version(&self) -> Option<&str> {
        self.scorer.as_deref().map(RiskScorer::model_version)
    }

    pub fn open_db(&self) -> Result<Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }

    fn load_owned_record(
        &self,
        conn: &Connection,
        ctx: &RequestContext,
        assessment_id: &Uuid,
        action: &str,
    ) -> Result<AssessmentRecord, CoreError> {
        let record = db::get_assessment(conn, assessment_id)?
            .ok_or(CoreError::AssessmentNotFound(*assessment_id))?;
        require_owner_or_admin(ctx, &record.assessment.requested_by, action)?;
        Ok(record)
    }

    // ── Scoring ──

    pub fn predict(&self, ctx: &RequestContext, raw: &RawObservation) -> Result<RiskAssessment, CoreError> {
        let observation = validate_observation(raw)?;
        let scorer = self
            .scorer
            .as_ref()
            .ok_or_else(|| CoreError::ModelUnavailable("no model bundle loaded".into()))?;
        let conn = self.open_db()?;
        Ok(scorer.assess(&observation, &ctx.user_id, &SqliteAssessmentSink::new(&conn))?)
    }

    pub fn assessment_history(
        &self,
        ctx: &RequestContext,
        limit: usize,
    ) -> Result<Vec<AssessmentRecord>, CoreError> {
        let conn = self.open_db()?;
        Ok(db::list_assessments_by_user(&conn, &ctx.user_id, limit.min(MAX_HISTORY))?)
    }

    /// Counts over the caller's own assessments; admins see everyone's.
    pub fn assessment_statistics(&self, ctx: &RequestContext) -> Result<AssessmentStatistics, CoreError> {
        let conn = self.open_db()?;
        let scope = (!ctx.is_admin()).then_some(ctx.user_id.as_str());
        Ok(db::assessment_statistics(&conn, scope)?)
    }

    /// Compare an assessment with two or three earlier ones of the same
    /// owner: trend chart plus a narrative on what improved and what did not.
    pub fn compare_assessments(
        &self,
        ctx: &RequestContext,
        current_id: &Uuid,
        past_ids: &[Uuid],
    ) -> Result<AssessmentComparison, CoreError> {
        if !COMPARISON_PAST_RANGE.contains(&past_ids.len()) {
            return Err(CoreError::InvalidComparison(format!(
                "select 2 or 3 earlier assessments, got {}",
                past_ids.len()
            )));
        }
        let mut seen = HashSet::from([*current_id]);
        if let Some(dup) = past_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(CoreError::InvalidComparison(format!(
                "assessment {dup} is selected more than once"
            )));
        }

        let conn = self.open_db()?;
        let current = self.load_owned_record(&conn, ctx, current_id, "compare assessments")?;
        let owner_id = current.assessment.requested_by.clone();
        let mut visits = vec![current];
        for id in past_ids {
            let record = self.load_owned_record(&conn, ctx, id, "compare assessments")?;
            if record.assessment.requested_by != owner_id {
                return Err(CoreError::InvalidComparison(
                    "the assessments belong to different users".into(),
                ));
            }
            visits.push(record);
        }
        visits.sort_by_key(|r| r.assessment.created_at);

        let observations: Vec<ClinicalObservation> = visits.iter().map(|r| r.observation).collect();
        let chart = render_trend(&observations)?;
        let id = Uuid::new_v4();
        let chart_ref = self.store.write_comparison_chart(current_id, &id, &chart)?;
        let narrative = self.synthesizer.comparison_narrative(&visits);

        let comparison = AssessmentComparison {
            id,
            current_assessment_id: *current_id,
            owner_id,
            visits: visits.iter().map(ComparisonVisit::from).collect(),
            narrative_text: narrative.text,
            narrative_source: narrative.source,
            chart_ref,
            generated_at: Utc::now(),
        };
        db::insert_audit_entry(
            &conn,
            &AuditEntry {
                timestamp: comparison.generated_at,
                user_id: ctx.user_id.clone(),
                action: "comparison_generated".into(),
                entity_type: "assessment".into(),
                entity_id: current_id.to_string(),
            },
        )?;

        tracing::info!(
            assessment_id = %current_id,
            comparison_id = %id,
            visits = comparison.visits.len(),
            narrative_source = comparison.narrative_source.as_str(),
            "Comparison generated"
        );
        Ok(comparison)
    }

    // ── Reports ──

    /// Render charts, narrative and PDF for an assessment. Regenerating
    /// replaces the previous files and artifact row but keeps the narrative
    /// it already has.
    pub fn generate_report(
        &self,
        ctx: &RequestContext,
        assessment_id: &Uuid,
    ) -> Result<ReportArtifact, CoreError> {
        let conn = self.open_db()?;
        let record = self.load_owned_record(&conn, ctx, assessment_id, "generate report")?;
        let AssessmentRecord {
            assessment,
            observation,
        } = &record;

        let charts = render_charts(observation)?;
        let chart_refs = persist_charts(&self.store, assessment_id, &charts)?;
        let narrative = match db::get_report(&conn, assessment_id)? {
            Some(previous) => Narrative {
                text: previous.narrative_text,
                source: previous.narrative_source,
                attempts: 0,
            },
            None => self.synthesizer.report_narrative(observation, assessment),
        };

        let document = assemble(ReportInput {
            observation: Some(observation),
            assessment: Some(assessment),
            narrative: Some(&narrative),
            charts: Some(&charts),
        })?;
        let pdf = render_pdf(&document)?;
        let document_ref = self.store.write_document(assessment_id, &pdf)?;

        let artifact = ReportArtifact {
            assessment_id: *assessment_id,
            narrative_text: narrative.text,
            narrative_source: narrative.source,
            chart_refs,
            document_ref,
            format: ReportFormat::Pdf,
            generated_at: Utc::now(),
        };

        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
        db::upsert_report(&tx, &artifact)?;
        db::insert_audit_entry(
            &tx,
            &AuditEntry {
                timestamp: artifact.generated_at,
                user_id: ctx.user_id.clone(),
                action: "report_generated".into(),
                entity_type: "assessment".into(),
                entity_id: assessment_id.to_string(),
            },
        )?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(
            assessment_id = %assessment_id,
            narrative_source = artifact.narrative_source.as_str(),
            bytes = pdf.len(),
            "Report generated"
        );
        Ok(artifact)
    }

    /// PDF bytes (`application/pdf`) of a generated report.
    pub fn report_document(&self, ctx: &RequestContext, assessment_id: &Uuid) -> Result<Vec<u8>, CoreError> {
        let conn = self.open_db()?;
        self.load_owned_record(&conn, ctx, assessment_id, "read report")?;
        if db::get_report(&conn, assessment_id)?.is_none() {
            return Err(CoreError::ReportNotFound(*assessment_id));
        }
        Ok(self.store.read_document(assessment_id)?)
    }

    /// PNG bytes (`image/png`) of one chart of a generated report.
    pub fn chart_image(
        &self,
        ctx: &RequestContext,
        assessment_id: &Uuid,
        kind: ChartKind,
    ) -> Result<Vec<u8>, CoreError> {
        let conn = self.open_db()?;
        self.load_owned_record(&conn, ctx, assessment_id, "read chart")?;
        if db::get_report(&conn, assessment_id)?.is_none() {
            return Err(CoreError::ReportNotFound(*assessment_id));
        }
        Ok(self.store.read_chart(assessment_id, kind)?)
    }

    // ── Chat and knowledge ──

    pub fn chat(&self, ctx: &RequestContext, question: &str) -> Result<ChatAnswer, CoreError> {
        let conn = self.open_db()?;
        let service = ChatService::new(
            &self.synthesizer,
            self.knowledge.as_ref(),
            &conn,
            &self.settings.chat,
        );
        Ok(service.answer(&ctx.user_id, question)?)
    }

    pub fn add_knowledge_document(
        &self,
        ctx: &RequestContext,
        new_doc: &NewKnowledgeDocument,
    ) -> Result<KnowledgeDocument, CoreError> {
        let conn = self.open_db()?;
        Ok(knowledge::add_document(
            &conn,
            &self.knowledge,
            ctx,
            new_doc,
            Duration::from_secs(self.settings.chat.fetch_timeout_secs),
        )?)
    }

    pub fn delete_knowledge_document(&self, ctx: &RequestContext, id: &Uuid) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        Ok(knowledge::delete_document(&conn, &self.knowledge, ctx, id)?)
    }

    pub fn list_knowledge_documents(&self) -> Result<Vec<KnowledgeDocument>, CoreError> {
        let conn = self.open_db()?;
        Ok(db::list_knowledge_documents(&conn)?)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmSettings, PathSettings};
    use crate::models::{NarrativeSource, RiskLabel, Role};
    use crate::pipeline::features::tests::sample_measurements;
    use crate::pipeline::features::RawValue;
    use crate::pipeline::knowledge::KnowledgeSource;
    use crate::pipeline::model::artifact::tests::install_constant_bundle;
    use crate::pipeline::narrative::llm::tests::ScriptedLlm;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn patient() -> RequestContext {
        RequestContext::new("alice", Role::Patient)
    }

    fn admin() -> RequestContext {
        RequestContext::new("root", Role::Admin)
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            paths: PathSettings {
                data_dir: dir.path().to_path_buf(),
            },
            llm: LlmSettings {
                retry_backoff_ms: 0,
                ..LlmSettings::default()
            },
            ..Settings::default()
        }
    }

    /// Services with a constant-probability model and the given LLM.
    fn services(probability: Option<f64>, llm: ScriptedLlm) -> (TempDir, CoreServices) {
        services_sharing(probability, Arc::new(llm))
    }

    fn services_sharing(probability: Option<f64>, llm: Arc<ScriptedLlm>) -> (TempDir, CoreServices) {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let scorer = probability.map(|p| {
            install_constant_bundle(&settings.paths.model_dir(), p);
            Arc::new(RiskScorer::load(&settings.paths.model_dir()).unwrap())
        });
        let knowledge = Arc::new(KnowledgeBase::new(Arc::new(HashedTermEmbedder::default())));
        let core = CoreServices::with_components(settings, scorer, llm, knowledge).unwrap();
        (dir, core)
    }

    #[test]
    fn end_to_end_high_risk_with_llm_down() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let raw = RawObservation::from(sample_measurements());

        let assessment = core.predict(&patient(), &raw).unwrap();
        assert_eq!(assessment.label, RiskLabel::Diabetic);
        assert_eq!(assessment.confidence_percent, 82.0);

        let artifact = core.generate_report(&patient(), &assessment.id).unwrap();
        assert_eq!(artifact.narrative_source, NarrativeSource::Fallback);
        assert!(artifact.narrative_text.contains("HIGH RISK"));
        assert!(artifact.narrative_text.contains("148.0"));
        assert!(artifact.narrative_text.contains("33.6"));

        let pdf = core.report_document(&patient(), &assessment.id).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        let png = core.chart_image(&patient(), &assessment.id, ChartKind::Radar).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
    }

    #[test]
    fn regeneration_overwrites_single_artifact() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let assessment = core
            .predict(&patient(), &RawObservation::from(sample_measurements()))
            .unwrap();

        let first = core.generate_report(&patient(), &assessment.id).unwrap();
        let first_chart = core.chart_image(&patient(), &assessment.id, ChartKind::Bar).unwrap();
        let second = core.generate_report(&patient(), &assessment.id).unwrap();
        let second_chart = core.chart_image(&patient(), &assessment.id, ChartKind::Bar).unwrap();

        assert_eq!(first.narrative_text, second.narrative_text);
        assert_eq!(first.chart_refs, second.chart_refs);
        assert_eq!(first.document_ref, second.document_ref);
        assert_eq!(first_chart, second_chart);

        let conn = core.open_db().unwrap();
        assert_eq!(db::count_reports(&conn, &assessment.id).unwrap(), 1);
        let stored = db::get_report(&conn, &assessment.id).unwrap().unwrap();
        assert_eq!(stored.generated_at, second.generated_at);
    }

    #[test]
    fn regeneration_keeps_the_first_narrative() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("Your glucose is elevated.".into()),
            Ok("Consider a follow-up visit.".into()),
        ]));
        let (_dir, core) = services_sharing(Some(0.82), llm.clone());
        let assessment = core
            .predict(&patient(), &RawObservation::from(sample_measurements()))
            .unwrap();

        let first = core.generate_report(&patient(), &assessment.id).unwrap();
        let second = core.generate_report(&patient(), &assessment.id).unwrap();

        assert_eq!(first.narrative_source, NarrativeSource::Llm);
        assert!(first.narrative_text.contains("Your glucose is elevated."));
        assert_eq!(first.narrative_text, second.narrative_text);
        assert_eq!(first.narrative_source, second.narrative_source);
        assert_eq!(llm.call_count(), 1);
        assert!(second.generated_at >= first.generated_at);
    }

    #[test]
    fn missing_model_degrades_with_user_message() {
        let (_dir, core) = services(None, ScriptedLlm::failing());
        let err = core
            .predict(&patient(), &RawObservation::from(sample_measurements()))
            .unwrap_err();
        assert!(matches!(err, CoreError::ModelUnavailable(_)));
        assert!(err.user_message().contains("temporarily unavailable"));
    }

    #[test]
    fn invalid_input_lists_every_field() {
        let (_dir, core) = services(Some(0.3), ScriptedLlm::failing());
        let mut raw = RawObservation::from(sample_measurements());
        raw.glucose = Some(RawValue::Text("high".into()));
        raw.age = None;

        match core.predict(&patient(), &raw).unwrap_err() {
            CoreError::Validation(e) => assert_eq!(e.fields(), vec!["glucose", "age"]),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn other_patients_cannot_read_reports() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let assessment = core
            .predict(&patient(), &RawObservation::from(sample_measurements()))
            .unwrap();
        core.generate_report(&patient(), &assessment.id).unwrap();

        let bob = RequestContext::new("bob", Role::Patient);
        assert!(matches!(
            core.report_document(&bob, &assessment.id),
            Err(CoreError::Forbidden(_))
        ));
        assert!(core.report_document(&admin(), &assessment.id).is_ok());
    }

    #[test]
    fn document_before_generation_is_report_not_found() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let assessment = core
            .predict(&patient(), &RawObservation::from(sample_measurements()))
            .unwrap();
        assert!(matches!(
            core.report_document(&patient(), &assessment.id),
            Err(CoreError::ReportNotFound(_))
        ));
    }

    #[test]
    fn history_and_statistics_reflect_predictions() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let raw = RawObservation::from(sample_measurements());
        core.predict(&patient(), &raw).unwrap();
        core.predict(&patient(), &raw).unwrap();

        assert_eq!(core.assessment_history(&patient(), 10).unwrap().len(), 2);
        let stats = core.assessment_statistics(&patient()).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.diabetic, 2);
    }

    #[test]
    fn statistics_are_scoped_to_the_caller() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        core.predict(&patient(), &RawObservation::from(sample_measurements()))
            .unwrap();

        let bob = RequestContext::new("bob", Role::Patient);
        assert_eq!(core.assessment_statistics(&bob).unwrap(), AssessmentStatistics::default());
        assert_eq!(core.assessment_statistics(&patient()).unwrap().total, 1);
        assert_eq!(core.assessment_statistics(&admin()).unwrap().total, 1);
    }

    /// Three assessments for `ctx` with falling glucose, oldest first.
    fn glucose_history(core: &CoreServices, ctx: &RequestContext) -> Vec<Uuid> {
        [170.0, 150.0, 120.0]
            .into_iter()
            .map(|glucose| {
                let mut m = sample_measurements();
                m.glucose = glucose;
                core.predict(ctx, &RawObservation::from(m)).unwrap().id
            })
            .collect()
    }

    #[test]
    fn comparison_orders_visits_and_renders_trend() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let ids = glucose_history(&core, &patient());

        let comparison = core
            .compare_assessments(&patient(), &ids[2], &[ids[1], ids[0]])
            .unwrap();

        let order: Vec<Uuid> = comparison.visits.iter().map(|v| v.assessment_id).collect();
        assert_eq!(order, ids);
        assert_eq!(comparison.owner_id, "alice");
        assert_eq!(comparison.narrative_source, NarrativeSource::Fallback);
        assert!(comparison
            .narrative_text
            .contains("Glucose went from 170.0 to 120.0 mg/dL"));
        let png = std::fs::read(&comparison.chart_ref).unwrap();
        assert!(png.starts_with(b"\x89PNG"));

        assert!(core
            .compare_assessments(&admin(), &ids[2], &[ids[0], ids[1]])
            .is_ok());
    }

    #[test]
    fn comparison_requires_two_or_three_distinct_past_assessments() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let ids = glucose_history(&core, &patient());
        let extra = glucose_history(&core, &patient());

        for past in [
            vec![ids[0]],
            vec![ids[0], ids[1], extra[0], extra[1]],
            vec![ids[0], ids[0]],
            vec![ids[0], ids[2]],
        ] {
            let err = core.compare_assessments(&patient(), &ids[2], &past).unwrap_err();
            assert!(matches!(err, CoreError::InvalidComparison(_)), "{past:?}");
        }
    }

    #[test]
    fn comparison_stays_within_one_owner() {
        let (_dir, core) = services(Some(0.82), ScriptedLlm::failing());
        let alice = glucose_history(&core, &patient());
        let bob_ctx = RequestContext::new("bob", Role::Patient);
        let bob = glucose_history(&core, &bob_ctx);

        assert!(matches!(
            core.compare_assessments(&patient(), &alice[2], &[alice[0], bob[0]]),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            core.compare_assessments(&bob_ctx, &alice[2], &[alice[0], alice[1]]),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            core.compare_assessments(&admin(), &alice[2], &[alice[0], bob[0]]),
            Err(CoreError::InvalidComparison(_))
        ));
    }

    #[test]
    fn knowledge_round_trip_through_chat() {
        let (_dir, core) = services(None, ScriptedLlm::always("Check your feet every day."));
        let doc = core
            .add_knowledge_document(
                &admin(),
                &NewKnowledgeDocument {
                    title: Some("Foot care".into()),
                    source: KnowledgeSource::PastedText {
                        text: "Inspect your feet daily for cuts and blisters.".into(),
                    },
                },
            )
            .unwrap();
        assert_eq!(core.list_knowledge_documents().unwrap().len(), 1);

        let answer = core.chat(&patient(), "How often should I inspect my feet?").unwrap();
        assert_eq!(answer.sources[0].document_id, doc.id);

        let forbidden = core.delete_knowledge_document(&patient(), &doc.id).unwrap_err();
        assert_eq!(forbidden.user_message(), "You do not have permission to do that.");

        core.delete_knowledge_document(&admin(), &doc.id).unwrap();
        let answer = core.chat(&patient(), "How often should I inspect my feet?").unwrap();
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn open_uses_configured_chunk_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&dir);
        settings.chat.chunk_chars = 50;
        settings.chat.chunk_overlap_chars = 5;
        let core = CoreServices::open(settings).unwrap();
        assert!(core.model_version().is_none());

        core.add_knowledge_document(
            &admin(),
            &NewKnowledgeDocument {
                title: Some("Activity".into()),
                source: KnowledgeSource::PastedText {
                    text: "Aim for at least 150 minutes of moderate activity every week, \
                           spread over most days, and break up long periods of sitting."
                        .into(),
                },
            },
        )
        .unwrap();
        assert!(core.knowledge.snapshot().chunk_count() > 1);
    }

    #[test]
    fn index_is_rebuilt_from_storage_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        {
            let knowledge = Arc::new(KnowledgeBase::new(Arc::new(HashedTermEmbedder::default())));
            let core = CoreServices::with_components(
                settings(&dir),
                None,
                Arc::new(ScriptedLlm::failing()),
                knowledge,
            )
            .unwrap();
            core.add_knowledge_document(
                &admin(),
                &NewKnowledgeDocument {
                    title: None,
                    source: KnowledgeSource::PastedText {
                        text: "Hydration supports kidney function.".into(),
                    },
                },
            )
            .unwrap();
        }

        let knowledge = Arc::new(KnowledgeBase::new(Arc::new(HashedTermEmbedder::default())));
        CoreServices::with_components(
            settings(&dir),
            None,
            Arc::new(ScriptedLlm::failing()),
            Arc::clone(&knowledge),
        )
        .unwrap();
        assert_eq!(knowledge.snapshot().document_count(), 1);
    }
}
