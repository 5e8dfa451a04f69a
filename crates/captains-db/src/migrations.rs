//! Embedded SQL migration runner.
//!
//! The schema lives in `migrations/*.sql`, compiled in with `include_str!`.
//! Each file runs once, in list order, and is recorded by name in
//! `_captains_migrations`. Request paths never create tables.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_log_entries",
        sql: include_str!("migrations/001_log_entries.sql"),
    },
    Migration {
        name: "002_watermarks",
        sql: include_str!("migrations/002_watermarks.sql"),
    },
];

/// Number of embedded migrations.
pub const MIGRATION_COUNT: usize = MIGRATIONS.len();

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every pending migration and returns how many were applied.
///
/// A migration and its `_captains_migrations` row commit together.
///
/// # Errors
///
/// Returns `MigrationError` if a migration fails or the tracking table
/// cannot be read.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_pending(conn, MIGRATIONS)
}

fn apply_pending(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    create_tracking_table(conn)?;

    let mut applied = 0;
    for migration in migrations {
        if is_recorded(conn, migration.name)? {
            tracing::debug!(migration = migration.name, "skipping recorded migration");
            continue;
        }
        apply_one(conn, migration).map_err(|source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        })?;
        applied += 1;
    }

    if applied > 0 {
        tracing::info!(applied, total = migrations.len(), "schema migrated");
    }
    Ok(applied)
}

fn create_tracking_table(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _captains_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )
    .map_err(|source| MigrationError::ExecutionFailed {
        name: "_captains_migrations".to_string(),
        source,
    })
}

fn is_recorded(conn: &Connection, name: &str) -> Result<bool, MigrationError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM _captains_migrations WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )
    .map_err(MigrationError::StateQuery)
}

fn apply_one(conn: &Connection, migration: &Migration) -> rusqlite::Result<()> {
    tracing::info!(migration = migration.name, "applying migration");
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _captains_migrations (name) VALUES (?1)",
        [migration.name],
    )?;
    tx.commit()
}
