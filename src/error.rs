//! Error types for morphstore.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for morphstore operations.
///
/// The container reader never produces these directly: malformed streams
/// surface as [`Event::ReadError`](crate::container::Event::ReadError) and
/// callers decide how to report them.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input file could not be opened
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Container header names a different file type
    #[error("invalid file type: expected {expected}, got {actual}")]
    InvalidFileType { expected: String, actual: String },

    /// Container header carries an unsupported version
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(i32),

    /// Container stream is malformed
    #[error("parse error: {0}")]
    Parse(String),

    /// Array or blob too long for an int32 length field
    #[error("{name}: {len} elements exceed the format limit")]
    BlockTooLarge { name: String, len: usize },

    /// Strings are NUL-terminated on disk
    #[error("string contains a NUL byte: {0:?}")]
    NulInString(String),

    /// External encoder failed
    #[error("encoder error: {0}")]
    Encode(String),

    /// Encoding was cancelled by the caller
    #[error("encoding cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for morphstore operations.
pub type Result<T> = std::result::Result<T, Error>;
