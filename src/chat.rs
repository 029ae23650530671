//! Grounded health chat.
//!
//! `safety screen → retrieve → prompt (passages + recent turns) → synthesize
//! → persist`. Safety short-circuits never reach retrieval or the LLM.
//! Every turn, short-circuited or not, is appended to the user's history.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ChatSettings;
use crate::db::{self, DatabaseError};
use crate::models::{ChatRoute, ChatTurn, NarrativeSource};
use crate::pipeline::knowledge::{RetrievedPassage, Retriever};
use crate::pipeline::narrative::fallback::CHAT_FALLBACK;
use crate::pipeline::narrative::sanitize::ensure_disclaimer;
use crate::pipeline::narrative::{NarrativeSynthesizer, SynthesisRequest};
use crate::pipeline::safety::{self, SafetyCategory, SafetyVerdict};

// ═══════════════════════════════════════════
// Types
// ═══════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A knowledge document an answer drew on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub route: ChatRoute,
    /// Retrieval or generation failed and a less informed answer was given.
    pub degraded: bool,
    /// `None` for safety directives, which involve no generation.
    pub narrative_source: Option<NarrativeSource>,
    pub sources: Vec<SourceRef>,
}

// ═══════════════════════════════════════════
// Prompts
// ═══════════════════════════════════════════

pub const GROUNDED_SYSTEM_PROMPT: &str = "\
You are a diabetes education assistant answering from admin-approved reference material.

RULES:
- Answer ONLY from the provided context. If it does not contain the answer, say you don't know \
and suggest talking to a doctor.
- You are NOT a doctor. Do NOT diagnose.
- Do NOT prescribe, start, stop, or change any medication or insulin dose.
- If something sounds like an emergency, tell the user to seek emergency care immediately.
- Prefer short, clear explanations a patient can understand.";

pub const GENERAL_SYSTEM_PROMPT: &str = "\
You are a safe, general health information assistant.

RULES:
- You are NOT a doctor. Do NOT diagnose or give treatment plans.
- Do NOT prescribe, start, stop, or change any medication or insulin dose.
- Provide only general health education and encourage the user to consult a doctor.
- If the user describes emergency-like symptoms, tell them to seek urgent care immediately.
- If you are not sure about something, say so.";

fn history_block(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let turns: Vec<String> = history
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.question, t.answer))
        .collect();
    format!("Recent conversation:\n{}\n\n", turns.join("\n\n"))
}

pub fn grounded_user_prompt(
    passages: &[RetrievedPassage],
    history: &[ChatTurn],
    question: &str,
) -> String {
    let context: Vec<String> = passages
        .iter()
        .map(|p| format!("[{}]\n{}", p.title, p.content))
        .collect();
    format!(
        "Use ONLY the admin-approved context below to answer the question.\n\n{}\
         === CONTEXT START ===\n{}\n=== CONTEXT END ===\n\nUser question: {question}",
        history_block(history),
        context.join("\n\n")
    )
}

pub fn general_user_prompt(history: &[ChatTurn], question: &str) -> String {
    format!(
        "Provide safe, general health information. Do NOT give a diagnosis, treatment, \
         or medication changes.\n\n{}User question: {question}",
        history_block(history)
    )
}

// ═══════════════════════════════════════════
// Service
// ═══════════════════════════════════════════

pub struct ChatService<'a> {
    synthesizer: &'a NarrativeSynthesizer,
    retriever: &'a dyn Retriever,
    conn: &'a Connection,
    settings: &'a ChatSettings,
}

impl<'a> ChatService<'a> {
    pub fn new(
        synthesizer: &'a NarrativeSynthesizer,
        retriever: &'a dyn Retriever,
        conn: &'a Connection,
        settings: &'a ChatSettings,
    ) -> Self {
        Self {
            synthesizer,
            retriever,
            conn,
            settings,
        }
    }

    pub fn answer(&self, user_id: &str, question: &str) -> Result<ChatAnswer, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        if let SafetyVerdict::ShortCircuit { category, rule } = safety::screen(question) {
            let route = match category {
                SafetyCategory::Emergency => ChatRoute::Emergency,
                SafetyCategory::MedicationChange => ChatRoute::MedicationChange,
            };
            tracing::info!(user_id, rule, route = route.as_str(), "Chat short-circuited by safety layer");
            let answer = ChatAnswer {
                answer: safety::directive(category),
                route,
                degraded: false,
                narrative_source: None,
                sources: Vec::new(),
            };
            self.persist(user_id, question, &answer)?;
            return Ok(answer);
        }

        let history = db::recent_chat_turns(self.conn, user_id, self.settings.history_turns)?;

        let (route, mut degraded, passages) =
            match self.retriever.retrieve(question, self.settings.top_k) {
                Ok(passages) if !passages.is_empty() => (ChatRoute::Grounded, false, passages),
                Ok(_) => (ChatRoute::General, false, Vec::new()),
                Err(e) => {
                    tracing::warn!(error = %e, "Retrieval failed, answering without grounding");
                    (ChatRoute::General, true, Vec::new())
                }
            };

        let (system, user) = match route {
            ChatRoute::Grounded => (
                GROUNDED_SYSTEM_PROMPT,
                grounded_user_prompt(&passages, &history, question),
            ),
            _ => (GENERAL_SYSTEM_PROMPT, general_user_prompt(&history, question)),
        };

        let (text, _attempts) = self.synthesizer.synthesize(&SynthesisRequest {
            purpose: "chat",
            system,
            user: &user,
            temperature: self.synthesizer.chat_temperature(),
        });
        let (text, source) = match text {
            Some(text) => (text, NarrativeSource::Llm),
            None => {
                degraded = true;
                (CHAT_FALLBACK.to_string(), NarrativeSource::Fallback)
            }
        };

        let mut sources: Vec<SourceRef> = Vec::new();
        for p in &passages {
            if !sources.iter().any(|s| s.document_id == p.document_id) {
                sources.push(SourceRef {
                    document_id: p.document_id,
                    title: p.title.clone(),
                });
            }
        }

        let answer = ChatAnswer {
            answer: ensure_disclaimer(&text),
            route,
            degraded,
            narrative_source: Some(source),
            sources,
        };
        self.persist(user_id, question, &answer)?;
        tracing::debug!(user_id, route = route.as_str(), degraded, "Chat answered");
        Ok(answer)
    }

    fn persist(&self, user_id: &str, question: &str, answer: &ChatAnswer) -> Result<(), ChatError> {
        db::insert_chat_turn(
            self.conn,
            &ChatTurn {
                user_id: user_id.to_string(),
                question: question.to_string(),
                answer: answer.answer.clone(),
                route: answer.route,
                degraded: answer.degraded,
                created_at: Utc::now(),
            },
        )?;
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
