//! Database layer for the captain's log.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. The log and watermark tables are created
//! here, once, when the store is opened.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: readers never block the single writer, which
//!   matches a workload of frequent fetches and occasional appends.
//! - **`r2d2` connection pool**: bounded connection reuse across the
//!   blocking worker threads that serve tool calls.
//! - **Embedded migrations**: SQL files are compiled in via `include_str!`
//!   so the schema cannot drift from the code that queries it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError, MIGRATION_COUNT};
pub use pool::{create_pool, open_database, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH};
