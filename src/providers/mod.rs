pub mod cloudflare;
pub mod gemini;
pub mod openai_compatible;
pub mod sticky;

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use thiserror::Error;

/// Binary attachment forwarded with a request (a page screenshot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Image {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            media_type: "image/png".to_owned(),
            bytes,
        }
    }

    pub fn to_base64(&self) -> String {
        B64_ENGINE.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }
}

/// Opaque payload the orchestrator forwards verbatim to whichever provider
/// it attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub prompt: String,
    pub image: Option<Image>,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }
}

/// Structured failure classification. Every backend normalizes its errors
/// into one of these before control returns to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Quota exceeded or throttled.
    RateLimited,
    /// Backend temporarily unavailable.
    ServiceUnavailable,
    /// Model or endpoint no longer exists.
    NotFoundOrRemoved,
    /// The provider's own internal sub-list (models, keys) ran out.
    Exhausted,
    Other,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            503 => Self::ServiceUnavailable,
            404 | 410 => Self::NotFoundOrRemoved,
            _ => Self::Other,
        }
    }

    /// Machine-readable error codes carried in provider error bodies
    /// (OpenAI-style `error.code`, Google-style `error.status`).
    pub fn from_error_code(code: &str) -> Self {
        match code {
            "rate_limit_exceeded" | "insufficient_quota" | "RESOURCE_EXHAUSTED" => {
                Self::RateLimited
            }
            "service_unavailable" | "UNAVAILABLE" => Self::ServiceUnavailable,
            "model_not_found" | "model_decommissioned" | "model_deprecated" | "NOT_FOUND" => {
                Self::NotFoundOrRemoved
            }
            _ => Self::Other,
        }
    }

    /// Whether a failure of this kind benches the provider for the rest of
    /// the run.
    pub fn benches(self) -> bool {
        !matches!(self, Self::Other)
    }

    /// The configuration names something that no longer exists.
    pub fn is_stale_config(self) -> bool {
        matches!(self, Self::NotFoundOrRemoved)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RateLimited => "rate limited",
            Self::ServiceUnavailable => "service unavailable",
            Self::NotFoundOrRemoved => "not found or removed",
            Self::Exhausted => "retries exhausted",
            Self::Other => "error",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    /// Transport-level failure (connect, timeout, body read). Never benches.
    pub(crate) fn transport(provider: &str, err: reqwest::Error) -> Self {
        let what = if err.is_timeout() { "timed out" } else { "request failed" };
        Self::other(format!("{provider} {what}: {err}"))
    }

    /// Classify a non-success HTTP response, preferring a structured error
    /// code in the body over the bare status.
    pub(crate) async fn from_response(provider: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let kind = classify(status, &body);
        Self::new(kind, format!("{provider} API returned {status}: {}", truncate(&body, 300)))
    }
}

fn classify(status: u16, body: &str) -> FailureKind {
    error_code(body)
        .as_deref()
        .map(FailureKind::from_error_code)
        .filter(|kind| *kind != FailureKind::Other)
        .unwrap_or_else(|| FailureKind::from_status(status))
}

fn error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("code")
        .and_then(|c| c.as_str())
        .or_else(|| error.get("status").and_then(|s| s.as_str()))
        .map(str::to_owned)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extension point for LLM backends. The orchestrator holds these behind
/// `dyn Provider` and never branches on provider identity.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &TaskRequest) -> Result<String, ProviderError>;
}

/// Settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Generation {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Generation {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 16384,
        }
    }
}
