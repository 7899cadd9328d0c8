use crate::artifacts::ArtifactError;
use crate::channels::ChannelError;
use crate::echo::EchoError;
use crate::node::NodeError;
use crate::profiler::ProfilerError;
use crate::session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Node error: {0}")]
    NodeError(#[from] NodeError),

    #[error("Echo error: {0}")]
    EchoError(#[from] EchoError),

    #[error("Channel error: {0}")]
    ChannelError(#[from] ChannelError),

    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),

    #[error("Profiler error: {0}")]
    ProfilerError(#[from] ProfilerError),

    #[error("Artifact error: {0}")]
    ArtifactError(#[from] ArtifactError),

    #[error("No free node with delay {0}")]
    NoMatchingNode(String),

    #[error("Check failed: {0}")]
    CheckFailed(String),

    #[error("{0} resource(s) failed to release")]
    ReleaseFailed(usize),
}

impl HarnessError {
    /// Failures a scenario marked as expected-to-fail is allowed to have:
    /// the echoed bytes not coming back intact. Setup, lifecycle and
    /// teardown failures never qualify.
    pub fn is_permitted_failure(&self) -> bool {
        matches!(self, HarnessError::SessionError(e) if e.is_echo_failure())
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
