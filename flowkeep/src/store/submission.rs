//! Handing workflows to a remote scheduler and marking them synced

use super::{edit_workflow_section, set_string, SaveOutcome, WorkflowStore};
use crate::error::{FlowkeepError, Result};
use crate::revision::RevisionId;
use crate::workflow::{WorkflowDocument, WorkflowId, STATUS_KEY, STATUS_SYNCED};
use serde::Serialize;
use serde_yaml::Value;

/// First-line comment recording the revision last accepted remotely
pub const ONLINE_VERSION_PREFIX: &str = "# online-version:";

/// Sample workflow written by `seed_demo`
pub const DEMO_WORKFLOW: &str = r#"workflow:
  name: tutorial
  schedule: "0 0 0 * * ? *"
tasks:
  - name: task_parent
    task_type: Shell
    command: echo "parent"
  - name: task_child_one
    task_type: Shell
    deps: [task_parent]
    command: echo "child one"
  - name: task_child_two
    task_type: Shell
    deps: [task_parent]
    command: echo "child two"
  - name: task_union
    task_type: Shell
    deps: [task_child_one, task_child_two]
    command: echo "union"
"#;

const DEMO_NAME: &str = "tutorial";

/// A workflow ready to be sent to a remote scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    /// Workflow identity
    pub id: WorkflowId,
    /// Display name
    pub name: String,
    /// Latest revision of the workflow's document
    pub revision: RevisionId,
    /// The document with every `$FILE{}` reference inlined
    pub document: WorkflowDocument,
}

/// Split a leading `# online-version:` line off `content`
pub(super) fn split_online_marker(content: &str) -> (Option<&str>, &str) {
    match content.split_once('\n') {
        Some((first, rest)) if first.trim_start().starts_with(ONLINE_VERSION_PREFIX) => {
            (Some(first.trim_end_matches('\r')), rest)
        }
        None if content.trim_start().starts_with(ONLINE_VERSION_PREFIX) => (Some(content), ""),
        _ => (None, content),
    }
}

/// Revision recorded in a leading `# online-version:` line
pub fn online_version(content: &str) -> Option<&str> {
    split_online_marker(content)
        .0
        .and_then(|line| line.trim_start().strip_prefix(ONLINE_VERSION_PREFIX))
        .map(str::trim)
        .filter(|rev| !rev.is_empty())
}

impl WorkflowStore {
    /// Inline every reference and pair the document with its latest revision
    ///
    /// Any unresolvable reference fails the whole submission.
    pub fn prepare_submission(&self, id: &WorkflowId) -> Result<Submission> {
        let stored = self.read(id)?;
        let document = self.parser()?.inline_references(&stored.document()?)?;

        let revision = self
            .revisions
            .history(&stored.location.location, None)?
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| {
                FlowkeepError::NotFound(format!("no revision of {}", stored.location.location))
            })?;

        Ok(Submission {
            id: stored.location.id,
            name: stored.location.name,
            revision,
            document,
        })
    }

    /// Record that `revision` was accepted remotely
    ///
    /// Writes the `# online-version:` line, sets `local_status: synced` and
    /// commits. Re-serializing drops other comments from the document.
    pub fn record_submission(
        &self,
        id: &WorkflowId,
        revision: &RevisionId,
    ) -> Result<Option<RevisionId>> {
        self.with_identity_lock(id, || {
            let stored = self.read(id)?;
            let (_, body) = split_online_marker(&stored.content);
            let Value::Mapping(mut root) = serde_yaml::from_str::<Value>(body)
                .map_err(|e| FlowkeepError::ParseFailure(format!("invalid YAML: {e}")))?
            else {
                return Err(FlowkeepError::ParseFailure(format!(
                    "{} is not a workflow document",
                    stored.location.location
                )));
            };

            edit_workflow_section(&mut root, |section| set_string(section, STATUS_KEY, STATUS_SYNCED));
            let content = format!(
                "{ONLINE_VERSION_PREFIX} {revision}\n{}",
                serde_yaml::to_string(&Value::Mapping(root))?
            );
            self.content.write(&stored.location.location, &content)?;

            let message = format!(
                "Update online-version marker for {} to {}",
                stored.location.name,
                revision.short()
            );
            self.revisions
                .commit(&[stored.location.location.as_str()], &message)
        })
    }

    /// Create the `tutorial` workflow when the store is empty
    pub fn seed_demo(&self) -> Result<Option<SaveOutcome>> {
        if !self.index.list()?.is_empty() {
            tracing::debug!("Store not empty, skipping demo workflow");
            return Ok(None);
        }
        let outcome = self.save(DEMO_NAME, DEMO_WORKFLOW, None)?;
        tracing::info!("Created demo workflow '{}' as {}", DEMO_NAME, outcome.location);
        Ok(Some(outcome))
    }
}
