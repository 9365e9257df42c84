use parley_shared::types::ChatId;
use parley_shared::{CryptoError, ProtocolError};
use parley_store::StoreError;
use thiserror::Error;

use crate::events::Severity;

/// Classified outcome of a failed backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 401 on an authenticated call, or no session to authenticate with.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// Rejected locally before any request was made.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unknown chat: {0}")]
    UnknownChat(ChatId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Unauthorized))
    }

    /// Text shown to the user by the view layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Transport(TransportError::Unauthorized) => {
                "Session expired, please log in again".to_string()
            }
            Self::Transport(TransportError::Http { body, .. }) => body.clone(),
            Self::Transport(TransportError::Timeout | TransportError::Network(_)) => {
                "Could not reach the server, please try again".to_string()
            }
            Self::Transport(TransportError::Decode(_)) => {
                "The server sent an unexpected response".to_string()
            }
            Self::UnknownChat(_) => "That chat is no longer available".to_string(),
            other => other.to_string(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Validation(_)
            | Self::UnknownChat(_)
            | Self::Transport(TransportError::Timeout | TransportError::Network(_)) => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}
