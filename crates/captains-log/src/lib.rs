//! Personal append-only log with per-scope incremental retrieval.
//!
//! Entries are appended under a `(username, project)` scope. A separate
//! watermark per scope records the highest entry id already delivered, so
//! a fetch returns only what arrived since the previous fetch and moves
//! the watermark forward in the same transaction.
//!
//! # Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | ids strictly increase, never reused | `AUTOINCREMENT` key assigned in a single `INSERT` |
//! | at most one fetch-and-advance per scope | [`ScopeLocks`] plus an `IMMEDIATE` transaction |
//! | a failed fetch advances nothing | one transaction per call, committed after every project |
//! | no entry skipped | the watermark only moves to an id that was returned |
//! | empty fetch is a no-op | the watermark is untouched when nothing is new |
//!
//! # Usage
//!
//! ```rust,ignore
//! use captains_log::Journal;
//!
//! let journal = Journal::new(pool);
//! journal.append_log("alice", "demo", "hello")?;
//! let fresh = journal.fetch_new("alice", &["demo"])?;
//! assert_eq!(fresh.get("demo").map(<[_]>::len), Some(1));
//! ```

mod error;
mod journal;
mod locks;
mod store;
mod watermark;

pub use error::JournalError;
pub use journal::{FetchResult, Journal};
pub use locks::ScopeLocks;
pub use store::{append_entry, entries_after, list_projects};
pub use watermark::{advance_watermark, ensure_watermark, get_watermark, set_watermark};
