//! Error taxonomy for the authorization gate
//!
//! Every variant here is recovered inside the orchestrator. The only failure
//! a user ever sees is the lockout view, and that is driven by an explicit
//! deny decision, never by one of these escaping.

use crate::identity::DeviceId;

/// Failures the orchestrator recovers from while reaching a decision.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Persisted identifier failed format validation and was regenerated.
    #[error("persisted device id {discarded:?} is invalid, regenerated as {replacement}")]
    InvalidIdentity {
        /// The value read from storage.
        discarded: String,
        /// The freshly generated identifier.
        replacement: DeviceId,
    },

    /// Fetch rejected, timed out, or answered with a non-2xx status.
    #[error("policy fetch failed: {0}")]
    Network(String),

    /// Response body did not have the expected table shape.
    #[error("malformed policy response: {0}")]
    MalformedResponse(String),

    /// Fetch failed and nothing was cached. Triggers fail-open.
    #[error("no cached authorization available")]
    NoCacheAvailable,

    /// Local persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<FetchError> for GateError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Network(detail) => Self::Network(detail),
            FetchError::Malformed(detail) => Self::MalformedResponse(detail),
        }
    }
}

/// Outcome of a single remote policy fetch that did not produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Local key/value store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage json error: {0}")]
    Json(#[from] serde_json::Error),
}
