//! Scope keys for log entries and watermarks.

use serde::{Deserialize, Serialize};

use crate::{require_non_empty, EmptyField, LOG_STREAM};

/// The `(username, project)` pair that addresses one logical log stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub username: String,
    pub project: String,
}

impl Scope {
    /// Builds a scope, rejecting empty usernames or projects.
    ///
    /// Project names are otherwise free-form: no case folding, no length cap.
    pub fn new(username: impl Into<String>, project: impl Into<String>) -> Result<Self, EmptyField> {
        let username = username.into();
        let project = project.into();
        require_non_empty("username", &username)?;
        require_non_empty("project", &project)?;
        Ok(Self { username, project })
    }

    /// The watermark key for this scope on the captain's log stream.
    pub fn watermark_key(&self) -> WatermarkKey {
        WatermarkKey {
            stream_name: LOG_STREAM.to_string(),
            username: self.username.clone(),
            project: self.project.clone(),
        }
    }
}

/// Composite primary key of a watermark row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatermarkKey {
    pub stream_name: String,
    pub username: String,
    pub project: String,
}

impl std::fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.stream_name, self.username, self.project)
    }
}
