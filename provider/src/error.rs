//! Error types for building the provider client

use thiserror::Error;

/// Errors that can occur while constructing a [`ResilientTransport`](crate::ResilientTransport)
#[derive(Debug, Error)]
pub enum BuildError {
    /// The base URL could not be parsed
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// URL as configured
        url: String,
        /// Parser message
        reason: String,
    },

    /// The HTTP client could not be initialized
    #[error("HTTP client initialization failed: {0}")]
    Client(String),
}
