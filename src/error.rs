//! Error types for the RTL engine

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface from the engine.
///
/// Per-element failures during a transformation pass (a detached node, a
/// malformed marker snapshot) are logged and skipped rather than returned, so
/// most of these only reach callers from construction or from the CLI.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected at engine construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A selector matched nothing where an element was required
    #[error("No element matches selector: {0}")]
    MissingElement(String),

    /// The node was removed from the document before it could be processed
    #[error("Node is detached from the document")]
    DetachedNode,

    /// Reading a document or config file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored transform snapshot on an element could not be decoded
    #[error("Malformed transform state: {0}")]
    State(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
