//! Error taxonomy shared by the transport, client and cache layers.
//!
//! - [`TransportError`]: network-level failures of a single outbound HTTP call,
//!   surfaced only after the retry budget is exhausted
//! - [`ExternalServiceError`]: everything a caller of the external todo service
//!   can observe; transport-specific types never cross this boundary
//! - [`CacheError`]: failures of the cache store backend
//!
//! Provider-confirmed absence is *not* an error: `get_by_id` returns `Ok(None)`.

use std::time::Duration;
use thiserror::Error;

/// Failure of an outbound HTTP call at the network layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure, or a broken response body.
    #[error("Network error: {0}")]
    Network(String),

    /// A single attempt exceeded its per-attempt ceiling.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,

    /// The request could not be built (bad URL, unserializable body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether a retry is likely to succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Failure of an operation on the external todo service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalServiceError {
    /// The transport gave up (retries exhausted, or a non-retryable network failure).
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The provider answered with a status the operation cannot interpret.
    #[error("Unexpected status {status} from provider during {operation}")]
    UnexpectedStatus {
        /// Operation that received the status (e.g. `list`)
        operation: &'static str,
        /// HTTP status code
        status: u16,
    },

    /// The provider's body could not be decoded.
    #[error("Malformed response from provider during {operation}: {reason}")]
    MalformedResponse {
        /// Operation that received the body
        operation: &'static str,
        /// Decoder message
        reason: String,
    },

    /// A value could not be interpreted as a provider id.
    #[error("Invalid provider id: {0}")]
    InvalidProviderId(String),

    /// The cache store failed.
    #[error("Cache failure: {0}")]
    Cache(#[from] CacheError),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ExternalServiceError {
    /// Whether this error stems from caller cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Transport(TransportError::Cancelled)
        )
    }
}

/// Failure of a cache store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A value could not be encoded or decoded.
    #[error("Cache serialization failed for key '{key}': {reason}")]
    Serialization {
        /// Key being read or written
        key: String,
        /// Encoder message
        reason: String,
    },

    /// The backing store is unavailable.
    #[error("Cache backend error: {0}")]
    Backend(String),
}
