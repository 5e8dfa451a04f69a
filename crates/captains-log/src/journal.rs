//! The captain's log operations exposed to the tool layer.
//!
//! [`Journal`] ties the log store, the watermark store and the scope lock
//! table together. Its methods block on SQLite and are meant to be called
//! from a blocking worker thread.

use std::collections::HashSet;

use captains_db::DbPool;
use captains_types::{require_non_empty, DeliveredEntry, LogEntry, Scope, WatermarkKey};
use rusqlite::{Connection, TransactionBehavior};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::JournalError;
use crate::locks::ScopeLocks;
use crate::store::{append_entry, entries_after, list_projects};
use crate::watermark::{advance_watermark, ensure_watermark, get_watermark};

/// New entries per requested project, in request order.
///
/// Serializes as a JSON object whose keys follow the order the projects
/// were requested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    projects: Vec<(String, Vec<DeliveredEntry>)>,
}

impl FetchResult {
    /// Entries delivered for `project`, if it was part of the request.
    pub fn get(&self, project: &str) -> Option<&[DeliveredEntry]> {
        self.projects
            .iter()
            .find(|(name, _)| name == project)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DeliveredEntry])> {
        self.projects
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
    }

    /// Number of projects in the result.
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Total number of entries across all projects.
    pub fn total_entries(&self) -> usize {
        self.projects.iter().map(|(_, entries)| entries.len()).sum()
    }

    fn push(&mut self, project: String, entries: Vec<DeliveredEntry>) {
        self.projects.push((project, entries));
    }
}

impl Serialize for FetchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.projects.len()))?;
        for (project, entries) in &self.projects {
            map.serialize_entry(project, entries)?;
        }
        map.end()
    }
}

/// Append-only captain's log with watermark-tracked incremental reads.
///
/// Cheap to clone; clones share the pool and the lock table.
#[derive(Clone)]
pub struct Journal {
    pool: DbPool,
    locks: ScopeLocks,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("pool_max_size", &self.pool.max_size())
            .field("scope_locks", &self.locks.len())
            .finish()
    }
}

impl Journal {
    /// Wraps a pool whose schema is already migrated.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            locks: ScopeLocks::new(),
        }
    }

    /// Appends one entry and returns it as stored.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty fields, `StorageUnavailable` otherwise.
    pub fn append(
        &self,
        username: &str,
        project: &str,
        message: &str,
    ) -> Result<LogEntry, JournalError> {
        require_non_empty("username", username)?;
        require_non_empty("project", project)?;
        require_non_empty("message", message)?;

        let conn = self.pool.get()?;
        let entry = append_entry(&conn, username, project, message)?;
        tracing::info!(entry_id = entry.id, username, project, "captain's log entry recorded");
        Ok(entry)
    }

    /// Appends one entry and returns the confirmation line
    /// `"[<timestamp>] <username>@<project>: <message>"`.
    ///
    /// # Errors
    ///
    /// Same as [`Journal::append`].
    pub fn append_log(
        &self,
        username: &str,
        project: &str,
        message: &str,
    ) -> Result<String, JournalError> {
        self.append(username, project, message)
            .map(|entry| entry.confirmation_line())
    }

    /// Distinct projects `username` has logged to, sorted by name.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty username, `StorageUnavailable` otherwise.
    pub fn list_projects(&self, username: &str) -> Result<Vec<String>, JournalError> {
        require_non_empty("username", username)?;
        let conn = self.pool.get()?;
        list_projects(&conn, username)
    }

    /// Current watermark for `(username, project)`, 0 if none.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty fields, `StorageUnavailable` otherwise.
    pub fn watermark(&self, username: &str, project: &str) -> Result<i64, JournalError> {
        let key = Scope::new(username, project)?.watermark_key();
        let conn = self.pool.get()?;
        get_watermark(&conn, &key)
    }

    /// Returns every entry not yet delivered for each requested project and
    /// moves each project's watermark past what was returned.
    ///
    /// The whole call is one unit of work. Every requested scope is locked
    /// (in key order), then all reads and watermark advances run in a single
    /// `IMMEDIATE` transaction that commits only once every project has
    /// succeeded. On any error nothing is advanced, so the same entries are
    /// returned by the next successful fetch.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty username, an empty or duplicated project
    /// list, or an empty project name; `StorageUnavailable` for storage
    /// failures.
    pub fn fetch_new<S: AsRef<str>>(
        &self,
        username: &str,
        projects: &[S],
    ) -> Result<FetchResult, JournalError> {
        let scopes = validate_fetch(username, projects)?;
        let keys: Vec<WatermarkKey> = scopes.iter().map(Scope::watermark_key).collect();

        let mut conn = self.pool.get()?;
        let result = self.locks.with_scopes(&keys, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut result = FetchResult::default();
            for (scope, key) in scopes.iter().zip(&keys) {
                let entries = fetch_and_advance(&tx, scope, key)?;
                result.push(scope.project.clone(), entries);
            }
            tx.commit()?;
            Ok::<_, JournalError>(result)
        })?;

        tracing::debug!(
            username,
            projects = result.len(),
            entries = result.total_entries(),
            "fetched new captain's log entries"
        );

        Ok(result)
    }
}

/// Reads the entries past `key`'s watermark and advances it to the last
/// one, inside the caller's transaction.
///
/// The caller holds the scope lock and the database write lock, so the
/// compare-and-set can only miss if something bypassed both; that is
/// reported as a storage failure and the caller's transaction rolls back.
fn fetch_and_advance(
    conn: &Connection,
    scope: &Scope,
    key: &WatermarkKey,
) -> Result<Vec<DeliveredEntry>, JournalError> {
    ensure_watermark(conn, key)?;
    let current = get_watermark(conn, key)?;
    let entries = entries_after(conn, &scope.username, &scope.project, current)?;

    if let Some(last) = entries.last() {
        if !advance_watermark(conn, key, current, last.id)? {
            tracing::error!(%key, expected = current, "watermark changed under the write lock");
            return Err(JournalError::StorageUnavailable(format!(
                "watermark for {key} changed during fetch"
            )));
        }
        tracing::debug!(
            %key,
            from = current,
            to = last.id,
            count = entries.len(),
            "advancing watermark"
        );
    }

    Ok(entries.into_iter().map(DeliveredEntry::from).collect())
}

fn validate_fetch<S: AsRef<str>>(
    username: &str,
    projects: &[S],
) -> Result<Vec<Scope>, JournalError> {
    require_non_empty("username", username)?;
    if projects.is_empty() {
        return Err(JournalError::InvalidInput(
            "projects must contain at least one project".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(projects.len());
    let mut scopes = Vec::with_capacity(projects.len());
    for project in projects {
        let project = project.as_ref();
        if !seen.insert(project) {
            return Err(JournalError::InvalidInput(format!(
                "project listed more than once: {project}"
            )));
        }
        scopes.push(Scope::new(username, project)?);
    }
    Ok(scopes)
}
