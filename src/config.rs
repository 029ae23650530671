use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::knowledge::chunker::{DEFAULT_CHUNK_CHARS, DEFAULT_OVERLAP_CHARS};

/// Application-level constants
pub const APP_NAME: &str = "Glycoscope";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for environment overrides, `__` separates nested sections
/// (`GLYCOSCOPE_LLM__MODEL` -> `llm.model`).
pub const ENV_PREFIX: &str = "GLYCOSCOPE_";

/// Project-local settings file, looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "glycoscope.toml";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "glycoscope_lib=info,glycoscope=info,warn"
}

/// Get the application data directory (`<data dir>/glycoscope`).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("glycoscope")
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("glycoscope").join("config.toml"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: app_data_dir(),
        }
    }
}

impl PathSettings {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("glycoscope.db")
    }

    /// Root of the versioned model artifact bundles.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("model")
    }

    /// Per-assessment report and chart outputs.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}

/// OpenAI-compatible chat completion service used for narratives and chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub report_temperature: f32,
    pub chat_temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            api_key: None,
            model: "llama-3.1-8b-instant".into(),
            report_temperature: 0.4,
            chat_temperature: 0.15,
            max_tokens: 700,
            timeout_secs: 30,
            retry_backoff_ms: 750,
        }
    }
}

/// Split and acceptance thresholds for the offline training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub test_fraction: f64,
    pub seed: u64,
    pub min_accuracy: f64,
    pub min_precision: f64,
    pub min_recall: f64,
    pub min_f1: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            min_accuracy: 0.70,
            min_precision: 0.55,
            min_recall: 0.50,
            min_f1: 0.55,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub top_k: usize,
    pub history_turns: usize,
    pub fetch_timeout_secs: u64,
    /// Knowledge document chunk window, in chars.
    pub chunk_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            history_turns: 5,
            fetch_timeout_secs: 10,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            chunk_overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

impl Settings {
    /// Load from defaults, the user and project TOML files, then `GLYCOSCOPE_*`
    /// environment variables (highest priority). A `.env` file in the working
    /// directory is applied to the process environment first.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let settings: Settings = Self::figment().extract()?;
        settings.validate()?;
        Ok(settings.with_fallback_api_key())
    }

    /// Provider chain, public so callers can layer extra providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = Path::new(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let split = self.training.test_fraction;
        if !(split > 0.0 && split < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "training.test_fraction".into(),
                reason: format!("must be strictly between 0 and 1, got {split}"),
            });
        }
        if self.chat.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chat.top_k".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.chat.chunk_overlap_chars >= self.chat.chunk_chars {
            return Err(ConfigError::InvalidValue {
                field: "chat.chunk_overlap_chars".into(),
                reason: format!(
                    "must be smaller than chat.chunk_chars ({})",
                    self.chat.chunk_chars
                ),
            });
        }
        Ok(())
    }

    /// Hosted deployments commonly export the provider key as `GROQ_API_KEY`.
    fn with_fallback_api_key(mut self) -> Self {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());
        }
        self
    }
}
