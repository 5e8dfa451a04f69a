//! Persistence for per-scope delivery watermarks.
//!
//! A watermark is the id of the last entry handed to a caller for one
//! `(stream, username, project)` key. A missing row reads as 0.

use captains_types::WatermarkKey;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::JournalError;

/// Reads the watermark for `key`, or 0 when no row exists.
///
/// # Errors
///
/// Returns `JournalError::StorageUnavailable` on SQL failure.
pub fn get_watermark(conn: &Connection, key: &WatermarkKey) -> Result<i64, JournalError> {
    let value = conn
        .query_row(
            "SELECT value FROM watermarks
             WHERE stream_name = ?1 AND username = ?2 AND project = ?3",
            params![key.stream_name, key.username, key.project],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

/// Upserts the watermark for `key` to `value`.
///
/// The stored value never decreases: setting a value below the current one
/// is rejected and leaves the row untouched. Setting the current value again
/// is a no-op that succeeds. Callers must hold the scope lock for `key`; the
/// fetch path uses [`advance_watermark`] instead.
///
/// # Errors
///
/// Returns `JournalError::InvalidInput` for a negative value or one below
/// the stored watermark, and `JournalError::StorageUnavailable` on SQL
/// failure.
pub fn set_watermark(conn: &Connection, key: &WatermarkKey, value: i64) -> Result<(), JournalError> {
    if value < 0 {
        return Err(JournalError::InvalidInput(format!(
            "watermark for {key} cannot be negative: {value}"
        )));
    }

    let changed = conn.execute(
        "INSERT INTO watermarks (stream_name, username, project, value)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (stream_name, username, project) DO UPDATE SET
            value = excluded.value,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE excluded.value >= watermarks.value",
        params![key.stream_name, key.username, key.project, value],
    )?;

    if changed == 0 {
        let current = get_watermark(conn, key)?;
        return Err(JournalError::InvalidInput(format!(
            "watermark for {key} cannot move backwards from {current} to {value}"
        )));
    }
    Ok(())
}

/// Creates the row for `key` at 0 if it does not exist yet. Existing rows
/// are left alone.
///
/// # Errors
///
/// Returns `JournalError::StorageUnavailable` on SQL failure.
pub fn ensure_watermark(conn: &Connection, key: &WatermarkKey) -> Result<(), JournalError> {
    conn.execute(
        "INSERT INTO watermarks (stream_name, username, project, value)
         VALUES (?1, ?2, ?3, 0)
         ON CONFLICT (stream_name, username, project) DO NOTHING",
        params![key.stream_name, key.username, key.project],
    )?;
    Ok(())
}

/// Moves the watermark for `key` from `expected` to `new_value`, but only
/// if the stored value still equals `expected`.
///
/// Returns `false` when the stored value had changed (or the row does not
/// exist), in which case nothing was written.
///
/// # Errors
///
/// Returns `JournalError::InvalidInput` if `new_value` is below `expected`,
/// and `JournalError::StorageUnavailable` on SQL failure.
pub fn advance_watermark(
    conn: &Connection,
    key: &WatermarkKey,
    expected: i64,
    new_value: i64,
) -> Result<bool, JournalError> {
    if new_value < expected {
        return Err(JournalError::InvalidInput(format!(
            "watermark for {key} cannot move backwards from {expected} to {new_value}"
        )));
    }

    let changed = conn.execute(
        "UPDATE watermarks
         SET value = ?5, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE stream_name = ?1 AND username = ?2 AND project = ?3 AND value = ?4",
        params![key.stream_name, key.username, key.project, expected, new_value],
    )?;
    Ok(changed == 1)
}
