use std::path::PathBuf;
use thiserror::Error;

use crate::format::Format;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Content store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Structural routing faults, surfaced at submission time.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Unknown format tag: '{0}'")]
    UnknownFormat(String),

    #[error("Conversion from {source} to {destination} is not supported")]
    UnsupportedConversion { source: Format, destination: Format },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No content entry for hash '{0}'")]
    NotFound(String),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-strategy failures. These are always absorbed by the dispatcher,
/// which advances to the next strategy; only an aggregate of all failures
/// ever reaches the job's terminal error message.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("required tool '{0}' is not installed on this host")]
    ToolMissing(String),

    #[error("'{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("No job with id '{0}'")]
    NotFound(String),

    #[error("Job '{0}' has not completed yet")]
    NotReady(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
