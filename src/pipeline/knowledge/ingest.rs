//! Turning an admin's upload, URL or pasted text into a stored document.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{KnowledgeDocument, KnowledgeSourceType};

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown"];
const MAX_TITLE_CHARS: usize = 80;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file type: {0} (expected .txt or .md)")]
    UnsupportedFile(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Knowledge content is empty")]
    EmptyContent,
}

/// Where new knowledge comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum KnowledgeSource {
    Upload { path: PathBuf },
    Url { url: String },
    PastedText { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKnowledgeDocument {
    /// Derived from the source when absent.
    pub title: Option<String>,
    pub source: KnowledgeSource,
}

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head)\b[^>]*>.*?</(script|style|noscript|head)>")
        .expect("valid regex")
});
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|h[1-6]|tr|section|article)\b[^>]*>").expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f]+").expect("valid regex"));
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

/// Visible text of an HTML page, paragraphs separated by blank lines.
pub fn strip_html(html: &str) -> String {
    let text = SCRIPT_STYLE_RE.replace_all(html, " ");
    let text = BLOCK_TAG_RE.replace_all(&text, "\n\n");
    let text = TAG_RE.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = SPACES_RE.replace_all(&text, " ");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_LINES_RE
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

fn read_upload(path: &Path) -> Result<String, IngestError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return Err(IngestError::UnsupportedFile(path.display().to_string()));
    }
    std::fs::read_to_string(path).map_err(|e| IngestError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn fetch_url(url: &str, timeout: Duration) -> Result<String, IngestError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(IngestError::InvalidUrl(url.to_string()));
    }
    let fetch_err = |reason: String| IngestError::Fetch {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;
    let response = client.get(url).send().map_err(|e| {
        if e.is_timeout() {
            fetch_err(format!("timed out after {}s", timeout.as_secs()))
        } else {
            fetch_err(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("HTTP {}", status.as_u16())));
    }
    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("html"))
        .unwrap_or(true);
    let body = response.text().map_err(|e| fetch_err(e.to_string()))?;

    Ok(if is_html { strip_html(&body) } else { body })
}

fn default_title(source: &KnowledgeSource, content: &str) -> String {
    let title = match source {
        KnowledgeSource::Upload { path } => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        KnowledgeSource::Url { url } => url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .trim_end_matches('/')
            .to_string(),
        KnowledgeSource::PastedText { .. } => content
            .lines()
            .map(|l| l.trim().trim_start_matches('#').trim())
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string(),
    };
    let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
    if title.is_empty() {
        "Untitled".into()
    } else {
        title
    }
}

/// Resolve a new document's content and metadata. Nothing is stored here.
pub fn prepare_document(
    new_doc: &NewKnowledgeDocument,
    uploaded_by: &str,
    fetch_timeout: Duration,
) -> Result<KnowledgeDocument, IngestError> {
    let (source_type, source_ref, content) = match &new_doc.source {
        KnowledgeSource::Upload { path } => (
            KnowledgeSourceType::Upload,
            path.file_name().map(|n| n.to_string_lossy().into_owned()),
            read_upload(path)?,
        ),
        KnowledgeSource::Url { url } => (
            KnowledgeSourceType::Url,
            Some(url.clone()),
            fetch_url(url, fetch_timeout)?,
        ),
        KnowledgeSource::PastedText { text } => (KnowledgeSourceType::PastedText, None, text.clone()),
    };

    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(IngestError::EmptyContent);
    }

    let title = new_doc
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_title(&new_doc.source, &content));

    Ok(KnowledgeDocument {
        id: Uuid::new_v4(),
        title,
        source_type,
        source_ref,
        content,
        uploaded_at: Utc::now(),
        uploaded_by: uploaded_by.to_string(),
    })
}
