//! Centralized error types for mailindex.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailindex library.
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file or directory does not exist.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The message could not be parsed as MIME at all.
    #[error("Unparseable MIME message: {0}")]
    Mime(String),

    /// An error reported by the SQLite store.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The shrink-and-retry budget was exhausted while persisting a message.
    #[error("Record for '{path}' still exceeds the store size limit after shrinking")]
    RecordTooLarge { path: PathBuf },

    /// The requested record does not exist in the store.
    #[error("No {kind} record with id {id}")]
    RecordNotFound { kind: &'static str, id: i64 },

    /// A malformed full-text query was rejected by the engine.
    #[error("Invalid search query: {0}")]
    Query(String),
}

/// Convenience alias for `Result<T, IndexError>`.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the engine-enforced per-record size limit.
    ///
    /// Only this exact condition triggers the adaptive shrink-and-retry
    /// path; every other storage error propagates untouched.
    pub fn is_record_size_limit(&self) -> bool {
        matches!(
            self,
            Self::Storage(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::TooBig,
                    ..
                },
                _,
            ))
        )
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `IndexError`
/// when no path context is available (prefer `IndexError::io`).
impl From<std::io::Error> for IndexError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
