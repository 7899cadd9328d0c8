use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to open session: {0}")]
    OpenFailed(String),

    #[error("Expected {expected} open session(s), node lists {found}")]
    SessionCountMismatch { expected: usize, found: usize },

    #[error("Node refused to close session on port {0}")]
    CloseRejected(u16),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Received {actual_len} of {expected_len} bytes, first difference at {first_difference:?}")]
    ByteMismatch {
        expected_len: usize,
        actual_len: usize,
        first_difference: Option<usize>,
    },

    #[error("Echo stopped after {actual_len} of {expected_len} bytes: {error}")]
    EchoIncomplete {
        expected_len: usize,
        actual_len: usize,
        error: String,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Node error: {0}")]
    NodeError(#[from] crate::node::NodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the error is about the echoed bytes rather than the session
    /// lifecycle.
    pub fn is_echo_failure(&self) -> bool {
        matches!(
            self,
            SessionError::ByteMismatch { .. } | SessionError::EchoIncomplete { .. }
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
