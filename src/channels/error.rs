use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open channel {source_alias} -> {destination_alias}: {reason}")]
    OpenFailed {
        source_alias: String,
        destination_alias: String,
        reason: String,
    },

    #[error("{failed} of {total} channel opens failed, first: {first}")]
    RouteOpenFailed {
        failed: usize,
        total: usize,
        first: Box<ChannelError>,
    },

    #[error("Failed to close channel {0}")]
    CloseFailed(String),

    #[error("Insufficient funding: {funding} < required {required}")]
    InsufficientFunding { funding: u128, required: u128 },

    #[error("Node error: {0}")]
    NodeError(#[from] crate::node::NodeError),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
