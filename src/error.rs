//! Error types for the multisig relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mixin API error {code} (status {status}): {description}")]
    Api {
        status: u16,
        code: u32,
        description: String,
    },

    #[error("Unexpected response from {operation}: {message}")]
    UnexpectedResponse { operation: String, message: String },

    #[error("Transaction decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for relayer operations
pub type RelayerResult<T> = Result<T, RelayerError>;

/// Failure while handling a single multisig output.
///
/// Each variant names the step that failed so the poller log line is enough
/// to tell a bad payload from a rejected broadcast.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("decode signed transaction: {0}")]
    Decode(#[source] RelayerError),

    #[error("send raw transaction: {0}")]
    Submit(#[source] RelayerError),
}
