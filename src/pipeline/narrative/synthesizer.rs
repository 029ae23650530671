//! Retry-then-fallback generation.
//!
//! `Attempt1 → Attempt2 → Fallback → Done`. A usable answer at either
//! attempt jumps straight to `Done`. Timeouts are ordinary failures here;
//! a client with no credentials skips the retry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::fallback::{comparison_fallback, report_fallback, summary_line};
use super::llm::{LlmClient, LlmRequest, ServiceError};
use super::prompt::{
    comparison_user_prompt, report_user_prompt, COMPARISON_SYSTEM_PROMPT, REPORT_SYSTEM_PROMPT,
};
use super::sanitize::{clean_output, ensure_disclaimer};
use crate::config::LlmSettings;
use crate::models::{AssessmentRecord, ClinicalObservation, NarrativeSource, RiskAssessment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Attempt1,
    Attempt2,
    Fallback,
    Done,
}

impl SynthesisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempt1 => "attempt_1",
            Self::Attempt2 => "attempt_2",
            Self::Fallback => "fallback",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub text: String,
    pub source: NarrativeSource,
    /// LLM calls made, 0–2.
    pub attempts: u8,
}

impl Narrative {
    pub fn used_fallback(&self) -> bool {
        self.source == NarrativeSource::Fallback
    }
}

/// What to send and what to say if nothing usable comes back.
pub struct SynthesisRequest<'a> {
    pub purpose: &'static str,
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
}

pub struct NarrativeSynthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
    report_temperature: f32,
    chat_temperature: f32,
    max_tokens: u32,
    backoff: Duration,
}

impl NarrativeSynthesizer {
    pub fn new(client: Arc<dyn LlmClient>, settings: &LlmSettings) -> Self {
        Self {
            client,
            model: settings.model.clone(),
            report_temperature: settings.report_temperature,
            chat_temperature: settings.chat_temperature,
            max_tokens: settings.max_tokens,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }

    pub fn chat_temperature(&self) -> f32 {
        self.chat_temperature
    }

    /// Drive the state machine. Returns cleaned text, or `None` on fallback.
    pub fn synthesize(&self, request: &SynthesisRequest<'_>) -> (Option<String>, u8) {
        let llm_request = LlmRequest {
            system: request.system,
            user: request.user,
            model: &self.model,
            temperature: request.temperature,
            max_tokens: self.max_tokens,
        };

        let mut state = SynthesisState::Attempt1;
        let mut attempts = 0u8;
        let mut output = None;

        loop {
            let next = match state {
                SynthesisState::Attempt1 | SynthesisState::Attempt2 => {
                    attempts += 1;
                    let failed_next = if state == SynthesisState::Attempt1 {
                        SynthesisState::Attempt2
                    } else {
                        SynthesisState::Fallback
                    };
                    match self.client.complete(&llm_request) {
                        Ok(raw) => match clean_output(&raw) {
                            Some(text) => {
                                output = Some(text);
                                SynthesisState::Done
                            }
                            None => {
                                tracing::warn!(
                                    purpose = request.purpose,
                                    attempt = attempts,
                                    "LLM returned no usable text"
                                );
                                failed_next
                            }
                        },
                        Err(ServiceError::NotConfigured) => {
                            tracing::debug!(purpose = request.purpose, "LLM not configured");
                            SynthesisState::Fallback
                        }
                        Err(e) => {
                            tracing::warn!(
                                purpose = request.purpose,
                                attempt = attempts,
                                error = %e,
                                "LLM call failed"
                            );
                            failed_next
                        }
                    }
                }
                SynthesisState::Fallback => SynthesisState::Done,
                SynthesisState::Done => break,
            };

            tracing::debug!(
                purpose = request.purpose,
                from = state.as_str(),
                to = next.as_str(),
                "Synthesis transition"
            );
            if next == SynthesisState::Attempt2 && !self.backoff.is_zero() {
                std::thread::sleep(self.backoff);
            }
            state = next;
        }

        if output.is_none() {
            tracing::info!(purpose = request.purpose, attempts, "Using fallback text");
        }
        (output, attempts)
    }

    /// Report narrative: summary line, body, disclaimer. Never fails.
    pub fn report_narrative(
        &self,
        observation: &ClinicalObservation,
        assessment: &RiskAssessment,
    ) -> Narrative {
        let user = report_user_prompt(observation, assessment);
        let (body, attempts) = self.synthesize(&SynthesisRequest {
            purpose: "report",
            system: REPORT_SYSTEM_PROMPT,
            user: &user,
            temperature: self.report_temperature,
        });

        let (body, source) = match body {
            Some(text) => (text, NarrativeSource::Llm),
            None => (report_fallback(observation, assessment), NarrativeSource::Fallback),
        };
        let text = ensure_disclaimer(&format!(
            "{}\n\n{}",
            summary_line(observation, assessment),
            body
        ));

        Narrative {
            text,
            source,
            attempts,
        }
    }

    /// Trend commentary over `visits`, oldest first. Never fails.
    pub fn comparison_narrative(&self, visits: &[AssessmentRecord]) -> Narrative {
        let user = comparison_user_prompt(visits);
        let (body, attempts) = self.synthesize(&SynthesisRequest {
            purpose: "comparison",
            system: COMPARISON_SYSTEM_PROMPT,
            user: &user,
            temperature: self.report_temperature,
        });

        let (body, source) = match body {
            Some(text) => (text, NarrativeSource::Llm),
            None => (comparison_fallback(visits), NarrativeSource::Fallback),
        };
        Narrative {
            text: ensure_disclaimer(&body),
            source,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLabel;
    use crate::pipeline::features::tests::sample_observation;
    use crate::pipeline::narrative::llm::tests::ScriptedLlm;
    use crate::pipeline::narrative::DISCLAIMER;
    use chrono::Utc;
    use uuid::Uuid;

    fn settings() -> LlmSettings {
        LlmSettings {
            retry_backoff_ms: 0,
            ..LlmSettings::default()
        }
    }

    fn assessment() -> RiskAssessment {
        RiskAssessment {
            id: Uuid::new_v4(),
            probability: 0.82,
            label: RiskLabel::Diabetic,
            confidence_percent: 82.0,
            model_version: "v1".into(),
            created_at: Utc::now(),
            requested_by: "u".into(),
        }
    }

    #[test]
    fn first_success_uses_llm_once() {
        let llm = Arc::new(ScriptedLlm::always("Your results suggest elevated risk."));
        let synth = NarrativeSynthesizer::new(llm.clone(), &settings());
        let n = synth.report_narrative(&sample_observation(), &assessment());
        assert_eq!(n.source, NarrativeSource::Llm);
        assert_eq!(n.attempts, 1);
        assert_eq!(llm.call_count(), 1);
        assert!(n.text.contains("Your results suggest elevated risk."));
        assert!(n.text.ends_with(DISCLAIMER));
    }

    #[test]
    fn retry_succeeds_on_second_attempt() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(ServiceError::Connection("x".into())),
            Ok("Second try worked.".into()),
        ]));
        let synth = NarrativeSynthesizer::new(llm.clone(), &settings());
        let n = synth.report_narrative(&sample_observation(), &assessment());
        assert_eq!(n.source, NarrativeSource::Llm);
        assert_eq!(n.attempts, 2);
    }

    #[test]
    fn two_failures_fall_back_without_error() {
        let llm = Arc::new(ScriptedLlm::failing());
        let synth = NarrativeSynthesizer::new(llm.clone(), &settings());
        let n = synth.report_narrative(&sample_observation(), &assessment());
        assert!(n.used_fallback());
        assert_eq!(n.attempts, 2);
        assert_eq!(llm.call_count(), 2);
        assert!(n.text.contains("HIGH RISK"));
        assert!(n.text.contains("148.0"));
        assert!(n.text.contains("33.6"));
        assert!(n.text.contains(DISCLAIMER));
    }

    #[test]
    fn unconfigured_client_falls_back_without_retry() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(ServiceError::NotConfigured)]));
        let synth = NarrativeSynthesizer::new(
            llm.clone(),
            &LlmSettings {
                retry_backoff_ms: 60_000,
                ..LlmSettings::default()
            },
        );
        let started = std::time::Instant::now();
        let n = synth.report_narrative(&sample_observation(), &assessment());
        assert!(n.used_fallback());
        assert_eq!(n.attempts, 1);
        assert_eq!(llm.call_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn dosing_only_answers_count_as_failures() {
        let llm = Arc::new(ScriptedLlm::always("Take 500 mg of metformin daily."));
        let synth = NarrativeSynthesizer::new(llm, &settings());
        let n = synth.report_narrative(&sample_observation(), &assessment());
        assert!(n.used_fallback());
        assert!(!n.text.contains("500 mg"));
    }

    #[test]
    fn summary_line_survives_any_llm_output() {
        let llm = Arc::new(ScriptedLlm::always("Unrelated text."));
        let synth = NarrativeSynthesizer::new(llm, &settings());
        let n = synth.report_narrative(&sample_observation(), &assessment());
        assert!(n.text.starts_with("Risk classification: HIGH RISK"));
    }

    #[test]
    fn comparison_falls_back_to_trend_summary() {
        let records: Vec<AssessmentRecord> = [0.8, 0.6]
            .into_iter()
            .map(|p| AssessmentRecord {
                assessment: RiskAssessment {
                    probability: p,
                    ..assessment()
                },
                observation: sample_observation(),
            })
            .collect();
        let llm = Arc::new(ScriptedLlm::failing());
        let synth = NarrativeSynthesizer::new(llm.clone(), &settings());

        let n = synth.comparison_narrative(&records);
        assert!(n.used_fallback());
        assert_eq!(llm.call_count(), 2);
        assert!(n.text.contains("Estimated risk fell from 80.0% to 60.0%"));
        assert!(n.text.ends_with(DISCLAIMER));

        let prompt = llm.last_user_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.starts_with("Patient assessments (oldest to most recent)"));
    }
}
