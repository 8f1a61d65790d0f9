use thiserror::Error;

use crate::data::model::LoadMode;

// ---------------------------------------------------------------------------
// LoadError – everything a load can surface to its caller
// ---------------------------------------------------------------------------

/// Errors returned by the loader and the result cache.
///
/// `Clone` because a single failed computation is delivered to every caller
/// that was waiting on the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Columns the load depends on are absent from the source schema.
    #[error("schema mismatch: source is missing column(s) {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// The environment guard refused the mode.
    #[error("{mode} mode is disallowed: {reason}")]
    ModeDisallowed { mode: LoadMode, reason: String },

    /// The storage reader failed (after the retry).
    #[error("upstream read failed: {0}")]
    UpstreamReadFailure(String),

    /// The request itself is malformed.
    #[error("invalid load request: {0}")]
    InvalidRequest(String),
}

impl LoadError {
    /// Flatten an `anyhow` chain into an upstream failure, keeping every context layer.
    pub fn upstream(err: anyhow::Error) -> Self {
        LoadError::UpstreamReadFailure(format!("{err:#}"))
    }

    /// Only reader failures are worth a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::UpstreamReadFailure(_))
    }
}
