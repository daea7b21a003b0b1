//! Unified error taxonomy for the router.
//!
//! Mirrors the error kinds a caller needs to distinguish: config problems at
//! construction time, per-candidate failures the orchestrator can recover
//! from by trying the next candidate, and the small set of errors that
//! escape fallback entirely (`Cancelled`, `ConfigInvalid`).

use thiserror::Error;

/// Errors produced anywhere in the request pipeline.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Config failed validation at construction time. Fatal.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A required piece of config (e.g. Vertex project id) is missing for
    /// the candidate currently being attempted. Skips this candidate.
    #[error("missing configuration for candidate: {0}")]
    ConfigMissing(String),

    /// No client template is registered for the candidate's provider.
    #[error("no client template for provider: {0}")]
    NoClient(String),

    /// Prepending `model_messages` produced an illegal role sequence.
    #[error("bad message sequence: {0}")]
    BadMessageSequence(String),

    /// The request or response payload could not be transformed.
    #[error("payload transform error: {0}")]
    Transform(String),

    /// Network-level failure talking to the upstream API.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream API returned a non-2xx status.
    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// The attempt exceeded its per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The caller's cancellation signal fired. Propagates immediately; no
    /// further retries or fallback candidates are attempted.
    #[error("request cancelled")]
    Cancelled,

    /// The health store failed. Recording call sites log and continue;
    /// health-check call sites treat the candidate as ineligible.
    #[error("health store error: {0}")]
    HealthStore(String),

    /// Every candidate was skipped or failed.
    #[error("all candidates failed, last error: {0}")]
    AllCandidatesFailed(Box<RouterError>),
}

impl RouterError {
    /// Whether this error, observed as the outcome of a single attempt,
    /// should be retried within the current candidate's retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::Network(_) | RouterError::UpstreamStatus { .. } | RouterError::Timeout(_)
        )
    }

    /// The upstream status code this error carries, if any. Used to resolve
    /// the per-observed-status retry budget (`status_code_retry`).
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            RouterError::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
