//! Histogram images and CSV records produced by profiling and session runs.

pub mod error;
pub mod types;
pub mod writer;

pub use error::{ArtifactError, ArtifactResult};
pub use types::{
    ArtifactConfig, ProfileArtifacts, SessionSummaryRow, SERIES_HEADER, SESSION_SUMMARY_HEADER,
};
pub use writer::{read_series, ArtifactWriter};
