//! Deleted workflows, restore, revert and per-identity history

use super::WorkflowStore;
use crate::error::{FlowkeepError, Result};
use crate::index::WorkflowRecord;
use crate::revision::{Revision, RevisionId};
use crate::workflow::{WorkflowDocument, WorkflowId};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::PoisonError;

/// Display name reported for deleted content that no longer parses
pub const UNKNOWN_WORKFLOW_NAME: &str = "Unknown (Parse Error)";

/// A location removed by some revision and not present now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedWorkflow {
    /// The removed location
    pub location: String,
    /// The most recent deleting revision
    pub revision: RevisionId,
    /// Name read from the content as it was before deletion
    pub name: String,
}

/// Result of `restore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    /// The restored location
    pub location: String,
    /// Identity found in the restored content
    pub id: Option<WorkflowId>,
    /// The restoring revision
    pub revision: Option<RevisionId>,
    /// Whether an index record was written
    pub indexed: bool,
}

impl WorkflowStore {
    /// Locations deleted at some revision and absent from the working tree,
    /// newest deletion first, one entry per location
    pub fn list_deleted(&self) -> Result<Vec<DeletedWorkflow>> {
        let mut seen = HashSet::new();
        let mut deleted = Vec::new();

        for deletion in self.revisions.deletions(self.content.extension())? {
            if !seen.insert(deletion.location.clone()) {
                continue;
            }
            if self.content.validate_location(&deletion.location).is_err() {
                tracing::debug!("Skipping deletion outside the content root: {}", deletion.location);
                continue;
            }
            if self.content.exists(&deletion.location)? {
                continue;
            }

            let name = self
                .content_before(&deletion.location, &deletion.revision)
                .ok()
                .and_then(|text| WorkflowDocument::from_yaml(&text).ok())
                .and_then(|doc| doc.workflow.name)
                .unwrap_or_else(|| UNKNOWN_WORKFLOW_NAME.to_string());

            deleted.push(DeletedWorkflow {
                location: deletion.location,
                revision: deletion.revision,
                name,
            });
        }
        Ok(deleted)
    }

    /// Content of `location` as it was just before `deleting_revision`
    pub fn deleted_content(&self, location: &str, deleting_revision: &str) -> Result<String> {
        self.content.validate_location(location)?;
        let revision = self.revisions.resolve(deleting_revision)?;
        self.content_before(location, &revision)
    }

    fn content_before(&self, location: &str, revision: &RevisionId) -> Result<String> {
        if let Some(parent) = self.revisions.parent(revision)? {
            if self.revisions.exists_at(location, &parent)? {
                return self.revisions.content_at(location, &parent);
            }
        }
        self.revisions.content_at(location, revision)
    }

    /// Bring a deleted location back from the parent of its deleting revision
    ///
    /// Re-inserts the index record from the restored content unless its
    /// identity or name is already taken, in which case only a warning is
    /// logged.
    pub fn restore(&self, location: &str, deleting_revision: &str) -> Result<RestoreOutcome> {
        self.content.validate_location(location)?;
        self.ensure_absent(location)?;

        let revision = self.revisions.resolve(deleting_revision)?;
        let parent = self.revisions.parent(&revision)?.ok_or_else(|| {
            FlowkeepError::NotFound(format!("revision {} has no parent to restore from", revision.short()))
        })?;
        if !self.revisions.exists_at(location, &parent)? {
            return Err(FlowkeepError::NotFound(format!(
                "{location} at revision {}",
                parent.short()
            )));
        }

        let content = self.revisions.content_at(location, &parent)?;
        let document = WorkflowDocument::from_yaml(&content);
        let claimed = document.as_ref().ok().and_then(|doc| doc.workflow.uuid.clone());
        match claimed {
            Some(id) => self.with_identity_lock(&id, || {
                self.restore_locked(location, &parent, document)
            }),
            None => self.restore_locked(location, &parent, document),
        }
    }

    fn ensure_absent(&self, location: &str) -> Result<()> {
        if self.content.exists(location)? {
            return Err(FlowkeepError::Conflict(format!(
                "{location} exists; it is not deleted"
            )));
        }
        Ok(())
    }

    fn restore_locked(
        &self,
        location: &str,
        parent: &RevisionId,
        document: Result<WorkflowDocument>,
    ) -> Result<RestoreOutcome> {
        let _names = self.creation_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_absent(location)?;

        let restored = self.revisions.restore_from(
            location,
            parent,
            &format!("Restore workflow: {location}"),
        )?;
        tracing::info!("Restored {} from revision {}", location, parent.short());

        let (id, name) = match document {
            Ok(doc) => (doc.workflow.uuid, doc.workflow.name),
            Err(e) => {
                tracing::warn!("Restored {} does not parse, index left untouched: {}", location, e);
                (None, None)
            }
        };

        let indexed = match (&id, name) {
            (Some(id), Some(name)) => self.reinsert_record(id, name)?,
            (Some(id), None) => {
                tracing::warn!("Restored workflow {} has no name, index left untouched", id);
                false
            }
            (None, _) => {
                tracing::warn!("Restored {} has no identity, index left untouched", location);
                false
            }
        };

        Ok(RestoreOutcome {
            location: location.to_string(),
            id,
            revision: restored,
            indexed,
        })
    }

    fn reinsert_record(&self, id: &WorkflowId, name: String) -> Result<bool> {
        if let Some(existing) = self.index.get(id)? {
            tracing::warn!(
                "Workflow {} is already indexed as '{}', not re-inserting",
                id,
                existing.name
            );
            return Ok(false);
        }
        if let Some(owner) = self.index.find_by_name(&name)? {
            tracing::warn!(
                "Name '{}' now belongs to workflow {}, not re-inserting {}",
                name,
                owner.id,
                id
            );
            return Ok(false);
        }
        self.index.upsert(WorkflowRecord::new(id.clone(), name))?;
        Ok(true)
    }

    /// Replace a live workflow's content with its content at `revision`
    ///
    /// The metadata index is not touched.
    pub fn revert(&self, id: &WorkflowId, revision: &str) -> Result<Option<RevisionId>> {
        self.with_identity_lock(id, || {
            let location = self.content.canonical_location(id);
            if !self.content.exists(&location)? {
                return Err(FlowkeepError::workflow_not_found(id));
            }

            let revision = self.revisions.resolve(revision)?;
            let content = self.revisions.content_at(&location, &revision)?;
            self.content.write(&location, &content)?;

            let message = format!("Revert {location} to version {}", revision.short());
            self.revisions.commit(&[location.as_str()], &message)
        })
    }

    /// Revisions of an identity's location since its most recent deletion,
    /// newest first
    pub fn history(&self, id: &WorkflowId) -> Result<Vec<Revision>> {
        let location = self.content.canonical_location(id);
        let since = self.revisions.last_deleting_revision(&location)?;
        self.revisions.history(&location, since.as_ref())
    }

    /// Textual diff introduced by `revision` for an identity's location
    pub fn diff(&self, id: &WorkflowId, revision: &str) -> Result<String> {
        let location = self.content.canonical_location(id);
        let revision = self.revisions.resolve(revision)?;
        self.revisions.diff(&location, &revision)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{create_test_store, doc, with_id};
    use super::*;

    #[test]
    fn test_delete_list_restore_round_trip() {
        let (_temp, store) = create_test_store();
        let created = store.save("daily-export", &doc("daily-export"), None).unwrap();
        let before = store.read(&created.id).unwrap().content;

        let deleting = store.delete(&created.id).unwrap().unwrap();
        let deleted = store.list_deleted().unwrap();
        assert_eq!(
            deleted,
            vec![DeletedWorkflow {
                location: created.location.clone(),
                revision: deleting.clone(),
                name: "daily-export".to_string(),
            }]
        );
        assert_eq!(
            store.deleted_content(&created.location, deleting.as_str()).unwrap(),
            before
        );

        let outcome = store.restore(&created.location, deleting.as_str()).unwrap();
        assert!(outcome.indexed);
        assert_eq!(outcome.id.as_ref(), Some(&created.id));
        assert_eq!(store.read(&created.id).unwrap().content, before);
        assert!(store.list_deleted().unwrap().is_empty());
    }

    #[test]
    fn test_deleted_lists_latest_deletion_once() {
        let (_temp, store) = create_test_store();
        let created = store.save("a", &doc("a"), None).unwrap();
        let first = store.delete(&created.id).unwrap().unwrap();
        store.restore(&created.location, first.as_str()).unwrap();
        let second = store.delete(&created.id).unwrap().unwrap();

        let deleted = store.list_deleted().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].location, created.location);
        assert_eq!(deleted[0].revision, second);
        assert_eq!(deleted[0].name, "a");
    }

    #[test]
    fn test_restore_commits_only_restored_location() {
        let (temp, store) = create_test_store();
        let created = store.save("a", &doc("a"), None).unwrap();
        let deleting = store.delete(&created.id).unwrap().unwrap();

        std::fs::write(temp.path().join("pending.yaml"), doc("pending")).unwrap();
        let staged = std::process::Command::new("git")
            .current_dir(temp.path())
            .args(["add", "pending.yaml"])
            .status()
            .unwrap();
        assert!(staged.success());
        let outcome = store.restore(&created.location, deleting.as_str()).unwrap();
        let revision = outcome.revision.unwrap();
        assert!(!store.revisions.exists_at("pending.yaml", &revision).unwrap());
        assert_eq!(
            store.history(&created.id).unwrap()[0].message,
            format!("Restore workflow: {}", created.location)
        );
        assert!(store.identity_locks.is_empty());
    }

    #[test]
    fn test_restore_existing_location_conflicts() {
        let (_temp, store) = create_test_store();
        let created = store.save("a", &doc("a"), None).unwrap();
        let head = created.revision.unwrap();
        let err = store.restore(&created.location, head.as_str()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[test]
    fn test_restore_skips_taken_name() {
        let (_temp, store) = create_test_store();
        let first = store.save("shared", &doc("shared"), None).unwrap();
        let deleting = store.delete(&first.id).unwrap().unwrap();
        let second = store.save("shared", &doc("shared"), None).unwrap();

        let outcome = store.restore(&first.location, deleting.as_str()).unwrap();
        assert!(!outcome.indexed);
        assert_eq!(store.find_by_name("shared").unwrap().unwrap().id, second.id);
        assert!(store.content_root().exists(&first.location).unwrap());
    }

    #[test]
    fn test_restore_rejects_unknown_revision_and_bad_location() {
        let (_temp, store) = create_test_store();
        let created = store.save("a", &doc("a"), None).unwrap();
        store.delete(&created.id).unwrap();

        assert!(store
            .restore(&created.location, "deadbeefdeadbeef")
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            store.restore("../../etc/passwd", "HEAD").unwrap_err().kind(),
            crate::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_history_starts_after_last_deletion() {
        let (_temp, store) = create_test_store();
        let created = store.save("a", &doc("a"), None).unwrap();
        let updated = with_id(&doc("a"), &created.id).replace("./load.sh", "./load-v2.sh");
        store.save("a", &updated, None).unwrap();
        assert_eq!(store.history(&created.id).unwrap().len(), 2);

        let deleting = store.delete(&created.id).unwrap().unwrap();
        assert!(store.history(&created.id).unwrap().is_empty());

        store.restore(&created.location, deleting.as_str()).unwrap();
        let content = with_id(&doc("a"), &created.id).replace("./load.sh", "./load-v3.sh");
        store.save("a", &content, None).unwrap();

        let history = store.history(&created.id).unwrap();
        let messages: Vec<_> = history.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Update workflow a",
                &*format!("Restore workflow: {}", created.location)
            ]
        );
    }

    #[test]
    fn test_revert_and_diff() {
        let (_temp, store) = create_test_store();
        let created = store.save("a", &doc("a"), None).unwrap();
        let original = store.read(&created.id).unwrap().content;
        let first = created.revision.unwrap();

        let updated = with_id(&doc("a"), &created.id).replace("./load.sh", "./load-v2.sh");
        let second = store.save("a", &updated, None).unwrap().revision.unwrap();

        let diff = store.diff(&created.id, second.as_str()).unwrap();
        assert!(
            diff.lines()
                .any(|l| l.starts_with('-') && l.contains("command: ./load.sh")),
            "{diff}"
        );
        assert!(
            diff.lines()
                .any(|l| l.starts_with('+') && l.contains("command: ./load-v2.sh")),
            "{diff}"
        );
        assert!(store.diff(&created.id, first.as_str()).unwrap().contains("+workflow:"));

        let reverted = store.revert(&created.id, first.as_str()).unwrap().unwrap();
        assert_eq!(store.read(&created.id).unwrap().content, original);
        assert_eq!(
            store.history(&created.id).unwrap()[0].message,
            format!("Revert {} to version {}", created.location, first.short())
        );
        assert_ne!(reverted, second);
    }

    #[test]
    fn test_deleted_name_falls_back_when_unparseable() {
        let (temp, store) = create_test_store();
        std::fs::write(temp.path().join("broken.yaml"), "tasks: [unclosed").unwrap();
        store.revisions.commit(&["broken.yaml"], "Add broken").unwrap();
        std::fs::remove_file(temp.path().join("broken.yaml")).unwrap();
        store.revisions.commit(&["broken.yaml"], "Remove broken").unwrap();

        let deleted = store.list_deleted().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].name, UNKNOWN_WORKFLOW_NAME);
    }
}
