//! Error types for Rave charge and requery operations

use thiserror::Error;

/// Rave error types
#[derive(Error, Debug)]
pub enum RaveError {
    /// Gateway answered with a top-level status other than `success`
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Transaction is still pending or otherwise not decided
    #[error("Transaction {reference} is undecided (status: {status})")]
    UndecisiveStatus {
        /// Transaction reference
        reference: String,
        /// Status reported by the gateway
        status: String,
    },

    /// Requery loop gave up without a decisive status
    #[error("Transaction {reference} still undecided after {attempts} requery attempts")]
    TimeoutExceeded {
        /// Transaction reference
        reference: String,
        /// Attempts made
        attempts: u32,
    },

    /// Network or HTTP layer failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Card payload cipher could not be set up
    #[error("Crypto unavailable: {0}")]
    CryptoUnavailable(String),

    /// Card charge returned an authorization mode this client does not know
    #[error("Unclassified authorization mode: {0}")]
    UnclassifiedAuthMode(String),

    /// Response body could not be decoded or lacks a required field
    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    /// Request failed validation before dispatch
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RaveError {
    /// Whether the error came from the network layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RaveError {
    fn from(err: reqwest::Error) -> Self {
        RaveError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RaveError {
    fn from(err: serde_json::Error) -> Self {
        RaveError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for RaveError {
    fn from(err: url::ParseError) -> Self {
        RaveError::Config(format!("invalid gateway url: {}", err))
    }
}

/// Result type for Rave operations
pub type RaveResult<T> = Result<T, RaveError>;
