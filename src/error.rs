//! Error taxonomy shared by every layer of the gateway.
//!
//! Library code returns [`Result<T>`] with a [`GatewayError`]. Each variant
//! carries a stable machine-readable [`code`](GatewayError::code) and an HTTP
//! [`status_code`](GatewayError::status_code) so the server can render
//! `{ "success": false, "error": { "code", "message" } }` without
//! inspecting message text.

use std::fmt;

use thiserror::Error;

/// The remote model service an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteService {
    Embedding,
    Generation,
}

impl fmt::Display for RemoteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteService::Embedding => f.write_str("embedding service"),
            RemoteService::Generation => f.write_str("generation service"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad caller input (empty or oversized question, malformed body).
    #[error("{0}")]
    Validation(String),

    /// The remote model did not answer within the configured timeout.
    #[error("{service} timed out: {message}")]
    Timeout {
        service: RemoteService,
        message: String,
    },

    /// The remote model refused the connection or returned an error.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: RemoteService,
        message: String,
    },

    /// Vector store failure.
    #[error("vector index error: {0}")]
    Index(String),

    #[error("embedding dimension mismatch: collection uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The source document is unreadable or produced no chunks.
    #[error("document error: {0}")]
    Document(String),

    #[error("Too many requests, please try again later")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::Timeout { .. } => "TIMEOUT_ERROR",
            GatewayError::Unavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::Index(_) | GatewayError::DimensionMismatch { .. } => "INDEX_ERROR",
            GatewayError::Document(_) => "DOCUMENT_ERROR",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Unavailable { .. } | GatewayError::Index(_) => 503,
            GatewayError::Timeout { .. } => 504,
            GatewayError::DimensionMismatch { .. }
            | GatewayError::Document(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => 500,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }

    /// Seconds a rate-limited client should wait, if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GatewayError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
