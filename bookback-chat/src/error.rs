use thiserror::Error;

/// Errors surfaced by the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not connected to chat server")]
    NotConnected,

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid {event} event: {reason}")]
    InvalidEvent { event: &'static str, reason: String },

    #[error("chat list request failed: {0}")]
    Http(String),

    #[error("malformed chat list response: {0}")]
    MalformedResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("chat list service has stopped")]
    ServiceClosed,
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
