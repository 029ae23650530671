//! Rule-based pre-filter for chat questions.
//!
//! Runs before retrieval and before any LLM call. Emergency language and
//! requests to change medication get a fixed directive instead of an answer.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::narrative::DISCLAIMER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyCategory {
    Emergency,
    MedicationChange,
}

/// Outcome of screening one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Clear,
    ShortCircuit {
        category: SafetyCategory,
        /// Which rule fired, for the log.
        rule: &'static str,
    },
}

struct SafetyPattern {
    regex: Regex,
    rule: &'static str,
}

fn pattern(re: &str, rule: &'static str) -> SafetyPattern {
    SafetyPattern {
        regex: Regex::new(re).expect("valid regex"),
        rule,
    }
}

static EMERGENCY_PATTERNS: LazyLock<Vec<SafetyPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"\bchest\s+pain", "chest_pain"),
        pattern(r"\b(?:can'?t|cannot|unable\s+to|can\s+not)\s+breathe?\b", "cannot_breathe"),
        pattern(r"\bshort(?:ness)?\s+of\s+breath\b", "shortness_of_breath"),
        pattern(r"\b(?:difficulty|trouble)\s+breathing\b", "difficulty_breathing"),
        pattern(r"\b(?:fainting|fainted|passed\s+out|passing\s+out)\b", "fainting"),
        pattern(r"\bunconscious(?:ness)?\b", "unconscious"),
        pattern(r"\b(?:loss\s+of|lost|losing|lose)\s+consciousness\b", "loss_of_consciousness"),
        pattern(r"\bheart\s+attack\b", "heart_attack"),
        pattern(r"\bconfused\s+and\s+sweating\b", "confused_and_sweating"),
        pattern(r"\bvery\s+low\s+(?:blood\s+)?sugar\b", "very_low_sugar"),
        pattern(r"\bseizures?\b", "seizure"),
        pattern(r"\bstroke\b", "stroke"),
    ]
});

static MEDICATION_CHANGE_PATTERNS: LazyLock<Vec<SafetyPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"\b(?:should|can|could|may)\s+i\s+stop\b", "stop_medication"),
        pattern(
            r"\b(?:reduce|lower|decrease|increase|raise|change|adjust)\s+my\s+(?:insulin|dose|dosage|medicine|medication|metformin)\b",
            "adjust_dose",
        ),
        pattern(r"\bskip\s+my\s+(?:dose|insulin|medicine|medication|pills?)\b", "skip_dose"),
        pattern(r"\bdouble\s+my\s+(?:dose|insulin|medicine|medication|pills?)\b", "double_dose"),
    ]
});

pub const EMERGENCY_RESPONSE: &str = "Your description may indicate a serious or emergency \
condition. Please go to the nearest hospital or call your local emergency number immediately. \
Do not rely on this chatbot for emergency care.";

pub const MEDICATION_CHANGE_RESPONSE: &str = "I cannot tell you to start, stop, or change any \
medication or insulin dose. Please discuss this with your doctor or healthcare provider before \
making any change.";

/// Lowercase and fold typographic apostrophes.
fn normalize(question: &str) -> String {
    question.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

fn first_match(patterns: &[SafetyPattern], text: &str) -> Option<&'static str> {
    patterns.iter().find(|p| p.regex.is_match(text)).map(|p| p.rule)
}

/// Emergency rules take precedence over medication rules.
pub fn screen(question: &str) -> SafetyVerdict {
    let text = normalize(question);
    if let Some(rule) = first_match(&EMERGENCY_PATTERNS, &text) {
        return SafetyVerdict::ShortCircuit {
            category: SafetyCategory::Emergency,
            rule,
        };
    }
    if let Some(rule) = first_match(&MEDICATION_CHANGE_PATTERNS, &text) {
        return SafetyVerdict::ShortCircuit {
            category: SafetyCategory::MedicationChange,
            rule,
        };
    }
    SafetyVerdict::Clear
}

/// Fixed directive for a short-circuited question, disclaimer included.
pub fn directive(category: SafetyCategory) -> String {
    let body = match category {
        SafetyCategory::Emergency => EMERGENCY_RESPONSE,
        SafetyCategory::MedicationChange => MEDICATION_CHANGE_RESPONSE,
    };
    format!("{body}\n\n{DISCLAIMER}")
}
