//! Revision-tracked file backend
//!
//! The [`RevisionStore`] trait is the narrow contract the workflow store needs
//! from a version-control backend: commit paths, list history, read content
//! at a revision, diff and restore. [`GitRevisionStore`] implements it by
//! driving the `git` command line.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod git;

pub use git::GitRevisionStore;

/// Opaque revision identifier (a commit hash for git)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    /// Wrap a backend revision identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in commit messages
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RevisionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One entry of a location's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Revision identifier
    pub id: RevisionId,
    /// Author name
    pub author: String,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// First line of the commit message
    pub message: String,
}

/// A revision that removed a location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    /// The removed location, relative to the content root
    pub location: String,
    /// The deleting revision
    pub revision: RevisionId,
}

/// Contract of the revision-tracked file backend
///
/// Locations are file names relative to the backend's root. Implementations
/// serialize their own writes.
pub trait RevisionStore: Send + Sync {
    /// Create the backing repository and author identity if missing; idempotent
    fn ensure_initialized(&self) -> Result<()>;

    /// Record the current working-tree state of `locations` (including
    /// removals) as one revision
    ///
    /// Returns `None` without creating a revision when none of the
    /// locations changed.
    fn commit(&self, locations: &[&str], message: &str) -> Result<Option<RevisionId>>;

    /// Validate a caller-supplied revision and return its full identifier
    fn resolve(&self, revision: &str) -> Result<RevisionId>;

    /// Newest revision of the repository, `None` before the first commit
    fn head(&self) -> Result<Option<RevisionId>>;

    /// Immediate parent of `revision`, `None` for a root revision
    fn parent(&self, revision: &RevisionId) -> Result<Option<RevisionId>>;

    /// Revisions touching `location`, newest first, excluding `since` and
    /// everything before it
    ///
    /// Only revisions whose tree actually contains `location` are returned.
    fn history(&self, location: &str, since: Option<&RevisionId>) -> Result<Vec<Revision>>;

    /// Most recent revision that removed `location`
    fn last_deleting_revision(&self, location: &str) -> Result<Option<RevisionId>>;

    /// Every revision that removed a file ending in `.{extension}`, newest first
    fn deletions(&self, extension: &str) -> Result<Vec<Deletion>>;

    /// Whether `location` exists in the tree of `revision`
    fn exists_at(&self, location: &str, revision: &RevisionId) -> Result<bool>;

    /// Content of `location` at `revision`; `NotFound` when absent there
    fn content_at(&self, location: &str, revision: &RevisionId) -> Result<String>;

    /// Textual diff of `location` introduced by `revision`
    ///
    /// A root revision is diffed against nothing.
    fn diff(&self, location: &str, revision: &RevisionId) -> Result<String>;

    /// Write `location` as of `revision` into the working tree and commit it
    /// with `message`, with no other write in between
    fn restore_from(
        &self,
        location: &str,
        revision: &RevisionId,
        message: &str,
    ) -> Result<Option<RevisionId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_revision() {
        let rev = RevisionId::new("0123456789abcdef");
        assert_eq!(rev.short(), "0123456");
        assert_eq!(RevisionId::new("abc").short(), "abc");
    }
}
