use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Node API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for NodeError {
    fn from(err: reqwest::Error) -> Self {
        NodeError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::SerializationError(err.to_string())
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
