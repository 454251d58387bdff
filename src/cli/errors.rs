use std::path::PathBuf;

use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Cannot read job file {path:?}: {reason}")]
    JobFile { path: PathBuf, reason: String },

    #[error("Invalid {option} option: {value}")]
    InvalidOption { option: String, value: String },

    #[error("{0}")]
    Retrieve(#[from] geosub::Error),
}
