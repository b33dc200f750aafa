use std::path::PathBuf;
use thiserror::Error;

/// Why a single task failed. The `Display` form is what lands in the
/// `error` column of the failure log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("connection error")]
    Network,

    #[error("{0}")]
    HttpStatus(u16),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            FetchError::Network
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Other(err.to_string())
    }
}

/// Errors that stop the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("File \"{}\" not found", .0.display())]
    MissingManifest(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
