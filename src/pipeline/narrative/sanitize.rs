//! Post-LLM cleanup: model artifacts, dosing sentences, disclaimer.

use std::sync::LazyLock;

use regex::Regex;

use super::DISCLAIMER;

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

static SPECIAL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<unused\d+>|<\|[a-z_]+\|>|</?s>").expect("valid regex"));

/// A number followed by a dosing unit. `mg/dL` is a lab unit, not a dose.
static DOSE_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|mcg|µg|units?|iu|ml|tablets?|pills?|capsules?)(?:[\s.,;:!?)]|$)")
        .expect("valid regex")
});

static DOSE_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:take|taking|inject|injecting|dose|dosage|start|starting|prescribe|twice|daily)\b")
        .expect("valid regex")
});

static DOSE_CHANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:increase|decrease|reduce|double|halve|adjust|raise|lower)\s+(?:your\s+|the\s+)?(?:insulin|metformin|medication|medicine|dose|dosage)\b",
    )
    .expect("valid regex")
});

/// Strip model-specific artifacts and surrounding whitespace.
pub fn strip_artifacts(raw: &str) -> String {
    let text = THINK_BLOCK_RE.replace_all(raw, "");
    let text = SPECIAL_TOKEN_RE.replace_all(&text, "");
    let text = text.trim();
    text.strip_prefix("Assistant:").unwrap_or(text).trim().to_string()
}

/// Whether a sentence tells the reader how much of a drug to take.
pub fn is_dosing_instruction(sentence: &str) -> bool {
    (DOSE_AMOUNT_RE.is_match(sentence) && DOSE_VERB_RE.is_match(sentence))
        || DOSE_CHANGE_RE.is_match(sentence)
}

/// Split a line into sentences, keeping terminal punctuation.
///
/// A boundary is `.`, `!` or `?` followed by whitespace, so decimals stay whole.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    out.push(&line[start..next_i]);
                    start = next_i;
                }
            } else {
                out.push(&line[start..i + c.len_utf8()]);
                start = line.len();
            }
        }
    }
    if start < line.len() {
        out.push(&line[start..]);
    }
    out
}

/// Drop every sentence that carries a dosing instruction. Line structure is kept.
pub fn strip_dosing(text: &str) -> String {
    let mut removed = 0usize;
    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            let kept: Vec<&str> = split_sentences(line)
                .into_iter()
                .filter(|s| {
                    let dosing = is_dosing_instruction(s);
                    removed += usize::from(dosing);
                    !dosing
                })
                .collect();
            kept.concat().trim().to_string()
        })
        .collect();

    if removed > 0 {
        tracing::warn!(removed, "Dosing sentences removed from LLM output");
    }

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.trim().to_string()
}

pub fn ensure_disclaimer(text: &str) -> String {
    if text.contains(DISCLAIMER) {
        text.to_string()
    } else if text.is_empty() {
        DISCLAIMER.to_string()
    } else {
        format!("{}\n\n{DISCLAIMER}", text.trim_end())
    }
}

/// Full cleanup of raw model output. `None` when nothing usable is left.
pub fn clean_output(raw: &str) -> Option<String> {
    let text = strip_dosing(&strip_artifacts(raw));
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
