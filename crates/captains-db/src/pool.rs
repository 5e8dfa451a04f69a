//! Connection pool creation and configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

use crate::migrations::{run_migrations, MigrationError};

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur while opening the database.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),

    /// A pooled connection could not be checked out for schema setup.
    #[error("failed to check out a connection for migrations: {0}")]
    Checkout(r2d2::Error),

    /// Schema setup failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Creates a SQLite connection pool with WAL mode, foreign keys and the
/// configured busy timeout on every connection.
///
/// Each `:memory:` connection is its own database, so an in-memory pool is
/// capped at one connection to keep every caller on the same data.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the connection pool cannot be created.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory", which is fine.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let max_size = if db_path == MEMORY_PATH {
        1
    } else {
        settings.pool_max_size.max(1)
    };

    let pool = Pool::builder().max_size(max_size).build(manager)?;

    tracing::debug!(path = db_path, max_size, "database pool created");

    Ok(pool)
}

/// Creates the pool and brings the schema up to date.
///
/// This is the single place where tables come into existence; callers run
/// it once at startup.
///
/// # Errors
///
/// Returns `PoolError` if the pool cannot be built, a connection cannot be
/// checked out, or a migration fails.
pub fn open_database(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let pool = create_pool(db_path, settings)?;
    {
        let conn = pool.get().map_err(PoolError::Checkout)?;
        let applied = run_migrations(&conn)?;
        if applied > 0 {
            tracing::info!(count = applied, path = db_path, "applied database migrations");
        }
    }
    Ok(pool)
}
