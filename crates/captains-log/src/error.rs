//! Error types for the captain's log.

use captains_types::EmptyField;

/// Errors surfaced by log and watermark operations.
///
/// Every storage-side failure collapses into `StorageUnavailable`; callers
/// only need to tell "you sent something wrong" from "try again later".
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// A required field was empty, or the request was malformed. Raised
    /// before any storage access.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The database could not be reached, was locked past the busy timeout,
    /// or rejected a write.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<EmptyField> for JournalError {
    fn from(err: EmptyField) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<rusqlite::Error> for JournalError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<r2d2::Error> for JournalError {
    fn from(err: r2d2::Error) -> Self {
        Self::StorageUnavailable(format!("db connection failed: {err}"))
    }
}
