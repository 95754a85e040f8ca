//! Client error types.

use ratedesk_common::DeskError;
use ratedesk_rates::RateError;
use thiserror::Error;

/// Errors raised while talking to the rate service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// Request could not be sent or timed out.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Server answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Body was not the expected JSON.
    #[error("Decode error: {0}")]
    Decode(String),

    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Unexpected Engine.IO / Socket.IO traffic.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted after shutdown.
    #[error("Client is shut down")]
    Closed,
}

impl ClientError {
    /// Check if retrying could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(_) | ClientError::WebSocket(_) => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            ClientError::Http(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<ClientError> for RateError {
    fn from(err: ClientError) -> Self {
        RateError::Provider(err.to_string())
    }
}

impl From<ClientError> for DeskError {
    fn from(err: ClientError) -> Self {
        let text = err.to_string();
        match err {
            ClientError::Http(message) | ClientError::WebSocket(message) => {
                DeskError::Network(message)
            }
            ClientError::Status { .. } => DeskError::Network(text),
            ClientError::Decode(message) => DeskError::Decode(message),
            ClientError::Protocol(message) => DeskError::Channel(message),
            ClientError::Config(message) => DeskError::Configuration(message),
            ClientError::Closed => DeskError::Channel(text),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
