use thiserror::Error;

#[derive(Error, Debug)]
pub enum EchoError {
    #[error("Failed to bind echo socket: {0}")]
    BindFailed(std::io::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type EchoResult<T> = Result<T, EchoError>;
