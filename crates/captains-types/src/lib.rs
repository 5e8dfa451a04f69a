//! Shared types for the captain's log tool server.
//!
//! This crate holds the records that cross crate boundaries: log entries as
//! stored, the reduced form handed back by incremental fetches, and the
//! scope keys used to address both the log and its watermarks.
//!
//! Nothing here touches storage. Validation of caller-supplied strings lives
//! here so that every layer rejects empty fields the same way.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod scope;
pub use scope::{Scope, WatermarkKey};

/// Stream name under which captain's log watermarks are tracked.
///
/// The watermark table is keyed by stream as well as scope so other
/// consumers could share it; this server only ever writes this one.
pub const LOG_STREAM: &str = "captains_log";

/// A required string field was empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} must not be empty")]
pub struct EmptyField(pub &'static str);

/// Checks that `value` is not the empty string.
///
/// Whitespace is content: `" "` is a valid, if odd, project name.
///
/// # Errors
///
/// Returns [`EmptyField`] naming `field` when the check fails.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), EmptyField> {
    if value.is_empty() {
        Err(EmptyField(field))
    } else {
        Ok(())
    }
}

/// A single captain's log entry as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Store-assigned identifier, strictly increasing and never reused.
    pub id: i64,
    /// Store-assigned UTC timestamp (`YYYY-MM-DDTHH:MM:SS.sssZ`).
    pub timestamp: String,
    /// Owner of the entry.
    pub username: String,
    /// Project the entry was logged against.
    pub project: String,
    /// Free-form entry text.
    pub message: String,
}

impl LogEntry {
    /// Human-readable confirmation line echoed back to the caller after an
    /// append.
    pub fn confirmation_line(&self) -> String {
        format!(
            "[{}] {}@{}: {}",
            self.timestamp, self.username, self.project, self.message
        )
    }
}

/// The part of a [`LogEntry`] returned by an incremental fetch.
///
/// Scope is implied by the request, so only the id, timestamp and message
/// are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredEntry {
    pub id: i64,
    pub timestamp: String,
    pub message: String,
}

impl From<LogEntry> for DeliveredEntry {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp,
            message: entry.message,
        }
    }
}
