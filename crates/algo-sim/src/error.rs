//! Categorised failures of outbound provider calls.

use std::time::Duration;

use thiserror::Error;

/// Why an outbound chat call did not produce a usable value.
///
/// Never surfaced to HTTP callers: every component that performs an outbound
/// call matches on this and substitutes its fallback.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("provider call exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable provider response: {0}")]
    Protocol(String),

    #[error("provider response failed validation: {0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Short label used as the `category` field in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connection",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "http",
            Self::Protocol(_) => "protocol",
            Self::Validation(_) => "validation",
            Self::Other(_) => "unexpected",
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;
