//! Error types for the publish pipeline

use std::path::PathBuf;

/// Every fatal failure the publish pipeline can hit.
///
/// Non-201 responses from the fileserver are *not* errors: the uploader and the
/// index writer hand those back as a [`crate::fileserver::FileserverResponse`]
/// and the orchestrator reports them.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The external conversion step failed or produced nothing
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Building the zip archive failed
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Timeout, connection failure or any other transport-level HTTP error
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The fileserver answered with a status the caller does not handle
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The local metadata file is unreadable or not a JSON object
    #[error("Invalid metadata in {}: {reason}", path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    /// JSON (de)serialization of the catalog failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Conditional catalog writes kept losing to concurrent publishers
    #[error("Catalog update for '{asset}' conflicted {attempts} times, giving up")]
    IndexConflict { asset: String, attempts: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for publish pipeline operations
pub type Result<T> = std::result::Result<T, PublishError>;
