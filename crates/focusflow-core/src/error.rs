//! Failures reported by the coaching collaborators.
//!
//! None of these ever reach the evaluation loop: the orchestrator logs them
//! and substitutes a local fallback at the call site.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Credentials or endpoint missing.
    #[error("service not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("service returned an empty response")]
    EmptyResponse,

    /// Collaborator exists but is currently skipped (open breaker, no device).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("playback failed: {0}")]
    Playback(String),
}

impl ServiceError {
    /// Whether the failure should count against the service's circuit breaker.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Transport(_) | Self::Timeout { .. } | Self::EmptyResponse
        )
    }
}
