use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to render plot: {0}")]
    Render(String),

    #[error("Nothing to persist: {0}")]
    Empty(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;
