// ABOUTME: Application-wide error types for the cutover CLI and config layer.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("state for {service} is locked by {holder} (pid {pid}) since {since}")]
    StateLocked {
        service: String,
        holder: String,
        pid: u32,
        since: String,
    },

    #[error("state store error: {0}")]
    State(String),

    #[error("deployment failed: {0}")]
    Deploy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
