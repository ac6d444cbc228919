//! Workflow identity

use crate::error::{FlowkeepError, Result};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Stable identity of a workflow, independent of its display name
///
/// New identities are ULIDs. Tokens minted by older deployments (UUIDs and
/// the like) are accepted as long as they are usable as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Generate a new ULID-based workflow identity
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Accept an existing identity token
    pub fn from_string(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        let invalid = trimmed.is_empty()
            || trimmed.contains(['/', '\\', '\0'])
            || trimmed.contains("..")
            || trimmed.starts_with('.');
        if invalid {
            return Err(FlowkeepError::InvalidLocation(format!(
                "'{id}' is not a valid workflow identity"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = FlowkeepError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = FlowkeepError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_string(value)
    }
}

impl From<WorkflowId> for String {
    fn from(id: WorkflowId) -> Self {
        id.0
    }
}
