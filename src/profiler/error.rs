use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("No samples received out of {sent} sent")]
    NoSamples { sent: usize },

    #[error("Cannot draw {requested} unique tags, only {available} are available")]
    TagSpaceExhausted { requested: usize, available: usize },

    #[error("Node error: {0}")]
    NodeError(#[from] crate::node::NodeError),
}

pub type ProfilerResult<T> = Result<T, ProfilerError>;
