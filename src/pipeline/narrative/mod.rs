//! Narrative synthesis: structured results to prose via an external LLM,
//! with one retry and a deterministic fallback.

pub mod fallback;
pub mod llm;
pub mod prompt;
pub mod sanitize;
pub mod synthesizer;

pub use llm::{ChatCompletionClient, LlmClient, LlmRequest, ServiceError};
pub use synthesizer::{Narrative, NarrativeSynthesizer, SynthesisRequest, SynthesisState};

/// Appended to every narrative and chat answer.
pub const DISCLAIMER: &str = "Disclaimer: this is general information, not medical advice. \
Always consult a qualified healthcare professional before making any medical decisions.";
