//! Error taxonomy (§7). Every crate boundary (C1/C2) surfaces one of these
//! kinds; C3/C4/C5 propagate them verbatim with context; C6 owns the
//! conversion to the user-visible `{kind, message}` frame.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("transient backend error: {0}")]
    TransientBackendError(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("LLM unavailable: {0}")]
    LLMUnavailable(String),

    #[error("search unavailable for domain {domain}: {reason}")]
    SearchUnavailable { domain: String, reason: String },

    #[error("no results from any domain")]
    NoResults,

    #[error("request cancelled")]
    Cancelled,

    #[error("request exceeded its deadline")]
    Deadline,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("engine not initialized: no domains exist yet")]
    NotInitialized,

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable `kind` string for the user-visible error frame (§6.3, §7).
    /// Never includes stack traces or internal identifiers.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ConstraintViolation(_) => "ConstraintViolation",
            Self::TransientBackendError(_) => "TransientBackendError",
            Self::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            Self::LLMUnavailable(_) => "LLMUnavailable",
            Self::SearchUnavailable { .. } => "SearchUnavailable",
            Self::NoResults => "NoResults",
            Self::Cancelled => "Cancelled",
            Self::Deadline => "Deadline",
            Self::BadRequest(_) => "BadRequest",
            Self::NotInitialized => "NotInitialized",
            Self::Internal(_) => "Internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::ConstraintViolation(_) => 409,
            Self::TransientBackendError(_) => 503,
            Self::EmbeddingUnavailable(_) | Self::LLMUnavailable(_) => 503,
            Self::SearchUnavailable { .. } => 502,
            Self::NoResults => 404,
            Self::Cancelled => 499,
            Self::Deadline => 504,
            Self::BadRequest(_) => 400,
            Self::NotInitialized => 409,
            Self::Internal(_) => 500,
        }
    }

    /// Short, user-facing message with no internal identifiers.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
