//! Error types for the rootfreq library.
//!
//! All fallible operations return [`Result`], with [`RootFreqError`] covering
//! both the fatal structural failures (unreadable dump, locked store) and the
//! ambient I/O and serialization errors. Parsing-level anomalies such as a
//! malformed relation tag or an unparseable count line are *not* errors: they
//! are logged, counted, and skipped at the point of discovery.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The main error type for rootfreq operations.
#[derive(Error, Debug)]
pub enum RootFreqError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The dump file does not exist or cannot be opened.
    #[error("Dump not found: {0}")]
    DumpNotFound(PathBuf),

    /// The dump file is below the sanity-check minimum size.
    #[error("Dump too small: {path} is {size} bytes (minimum {min})")]
    DumpTooSmall {
        /// Path of the rejected dump.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
        /// Required minimum in bytes.
        min: u64,
    },

    /// The dump stream failed to decompress.
    #[error("Corrupt dump: {0}")]
    CorruptDump(String),

    /// A frequency source with an extension the loader does not handle.
    #[error("Unsupported frequency format: {0}")]
    UnsupportedFormat(String),

    /// A frequency source too small or empty to be a usable corpus.
    #[error("Invalid frequency table: {0}")]
    InvalidFrequencyTable(String),

    /// The entry store is write-locked and retries were exhausted.
    #[error("Store locked: {0}")]
    StoreLocked(String),

    /// A build-stage artifact that the build state claims exists is missing.
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// Entry-store errors.
    #[error("Store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary artifact serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with RootFreqError.
pub type Result<T> = std::result::Result<T, RootFreqError>;

impl RootFreqError {
    /// Create a new store error.
    pub fn store<S: Into<String>>(msg: S) -> Self {
        RootFreqError::Store(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        RootFreqError::Serialization(msg.into())
    }

    /// Create a new corrupt-dump error.
    pub fn corrupt_dump<S: Into<String>>(msg: S) -> Self {
        RootFreqError::CorruptDump(msg.into())
    }

    /// Create a new missing-artifact error.
    pub fn missing_artifact<S: Into<String>>(msg: S) -> Self {
        RootFreqError::MissingArtifact(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        RootFreqError::Other(msg.into())
    }
}

impl From<bincode::Error> for RootFreqError {
    fn from(err: bincode::Error) -> Self {
        RootFreqError::Serialization(err.to_string())
    }
}
