//! Persistence for the append-only log.
//!
//! All writes go through [`append_entry`], which assigns the id and the
//! timestamp inside a single `INSERT`. Reads go through [`entries_after`],
//! which returns one scope's entries past a given id, oldest first.

use captains_types::{require_non_empty, LogEntry};
use rusqlite::{params, Connection, Row};

use crate::error::JournalError;

/// Appends one entry and returns it with its store-assigned id and
/// timestamp.
///
/// The id comes from the `AUTOINCREMENT` primary key. The timestamp is the
/// later of the current clock and the newest stored timestamp, computed in
/// the same statement, so neither can go backwards.
///
/// # Errors
///
/// Returns `JournalError::InvalidInput` if any field is empty, and
/// `JournalError::StorageUnavailable` if the insert fails.
pub fn append_entry(
    conn: &Connection,
    username: &str,
    project: &str,
    message: &str,
) -> Result<LogEntry, JournalError> {
    require_non_empty("username", username)?;
    require_non_empty("project", project)?;
    require_non_empty("message", message)?;

    let (id, timestamp) = conn.query_row(
        "INSERT INTO log_entries (timestamp, username, project, message)
         VALUES (
            MAX(
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                COALESCE((SELECT timestamp FROM log_entries ORDER BY id DESC LIMIT 1), '')
            ),
            ?1, ?2, ?3
         )
         RETURNING id, timestamp",
        params![username, project, message],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )?;

    tracing::debug!(entry_id = id, username, project, "appended log entry");

    Ok(LogEntry {
        id,
        timestamp,
        username: username.to_string(),
        project: project.to_string(),
        message: message.to_string(),
    })
}

/// Returns every entry in `(username, project)` with an id greater than
/// `after_id`, in ascending id order.
///
/// # Errors
///
/// Returns `JournalError::StorageUnavailable` on SQL failure.
pub fn entries_after(
    conn: &Connection,
    username: &str,
    project: &str,
    after_id: i64,
) -> Result<Vec<LogEntry>, JournalError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, timestamp, username, project, message
         FROM log_entries
         WHERE username = ?1 AND project = ?2 AND id > ?3
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![username, project, after_id], map_row_to_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Lists the distinct projects `username` has logged to, sorted by name.
///
/// # Errors
///
/// Returns `JournalError::InvalidInput` for an empty username and
/// `JournalError::StorageUnavailable` on SQL failure.
pub fn list_projects(conn: &Connection, username: &str) -> Result<Vec<String>, JournalError> {
    require_non_empty("username", username)?;

    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT project FROM log_entries WHERE username = ?1 ORDER BY project ASC",
    )?;
    let rows = stmt.query_map([username], |row| row.get::<_, String>(0))?;
    let mut projects = Vec::new();
    for row in rows {
        projects.push(row?);
    }
    Ok(projects)
}

fn map_row_to_entry(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        username: row.get(2)?,
        project: row.get(3)?,
        message: row.get(4)?,
    })
}
