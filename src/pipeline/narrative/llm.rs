//! LLM client seam and the OpenAI-compatible HTTP implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmSettings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot reach LLM service at {0}")]
    Connection(String),

    #[error("LLM service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable LLM response: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("LLM service not configured (no API key)")]
    NotConfigured,
}

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text completion service (allows mocking).
pub trait LlmClient: Send + Sync {
    fn complete(&self, request: &LlmRequest<'_>) -> Result<String, ServiceError>;
}

/// Client for any `POST {base_url}/chat/completions` endpoint.
pub struct ChatCompletionClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl ChatCompletionClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            client,
            timeout_secs: settings.timeout_secs,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for ChatCompletionClient {
    fn complete(&self, request: &LlmRequest<'_>) -> Result<String, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    ServiceError::Connection(self.base_url.clone())
                } else {
                    ServiceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(self.timeout_secs)
            } else {
                ServiceError::Parse(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Parse("response has no choices".into()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted outcomes in order; the last one repeats.
    pub(crate) struct ScriptedLlm {
        script: Vec<Result<String, ServiceError>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) last_user_prompt: Mutex<Option<String>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(script: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            }
        }

        pub(crate) fn always(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub(crate) fn failing() -> Self {
            Self::new(vec![Err(ServiceError::Timeout(30))])
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LlmClient for ScriptedLlm {
        fn complete(&self, request: &LlmRequest<'_>) -> Result<String, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user_prompt.lock().unwrap() = Some(request.user.to_string());
            let idx = n.min(self.script.len().saturating_sub(1));
            self.script[idx].clone()
        }
    }

    #[test]
    fn missing_key_is_not_configured() {
        let client = ChatCompletionClient::new(&LlmSettings {
            api_key: None,
            ..LlmSettings::default()
        })
        .unwrap();
        assert!(!client.is_configured());

        let request = LlmRequest {
            system: "s",
            user: "u",
            model: "m",
            temperature: 0.1,
            max_tokens: 10,
        };
        assert_eq!(client.complete(&request), Err(ServiceError::NotConfigured));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let client = ChatCompletionClient::new(&LlmSettings {
            api_key: Some("   ".into()),
            ..LlmSettings::default()
        })
        .unwrap();
        assert!(!client.is_configured());
    }

    #[test]
    fn unreachable_service_is_an_error_not_a_panic() {
        let client = ChatCompletionClient::new(&LlmSettings {
            base_url: "http://127.0.0.1:1/v1/".into(),
            api_key: Some("test".into()),
            timeout_secs: 2,
            ..LlmSettings::default()
        })
        .unwrap();
        let request = LlmRequest {
            system: "s",
            user: "u",
            model: "m",
            temperature: 0.1,
            max_tokens: 10,
        };
        assert!(client.complete(&request).is_err());
    }

    #[test]
    fn response_parsing_reads_first_choice() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hello"));
    }
}
