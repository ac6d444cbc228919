//! Versioned workflow store
//!
//! Gives every workflow a stable identity, keeps its document at
//! `{identity}.{ext}` under the content root, records every change as a
//! revision and keeps the metadata index in step.
//!
//! Operations on one identity are serialized by a per-identity lock. Name
//! uniqueness checks and index writes happen under a store-wide lock.

use crate::config::{ModifiedMarkerPolicy, StoreConfig};
use crate::content_root::ContentRoot;
use crate::error::{FlowkeepError, Result};
use crate::index::{FileMetadataIndex, MetadataIndex, WorkflowRecord};
use crate::revision::{GitRevisionStore, RevisionId, RevisionStore};
use crate::workflow::{
    DagView, DefinitionParser, IndexLinker, WorkflowDocument, WorkflowId, STATUS_KEY,
    STATUS_MODIFIED, STATUS_SYNCED, UUID_KEY,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::sync::{Arc, Mutex, PoisonError};

mod history;
mod submission;

pub use history::{DeletedWorkflow, RestoreOutcome, UNKNOWN_WORKFLOW_NAME};
pub use submission::{online_version, Submission, DEMO_WORKFLOW, ONLINE_VERSION_PREFIX};

const WORKFLOW_KEY: &str = "workflow";
const NAME_KEY: &str = "name";

/// `list` status of a document that exists but does not parse
pub const STATUS_UNREADABLE: &str = "unreadable";

/// Result of a successful `save`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// Workflow identity
    pub id: WorkflowId,
    /// Canonical location of the document
    pub location: String,
    /// True when a new identity was minted
    pub created: bool,
    /// The new revision; `None` when the content was unchanged
    pub revision: Option<RevisionId>,
}

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    /// Workflow identity
    pub id: WorkflowId,
    /// Display name from the metadata index
    pub name: String,
    /// Canonical location
    pub location: String,
    /// Last modification of the document; `None` when it is missing
    pub last_modified: Option<DateTime<Utc>>,
    /// `local_status` marker of the document, or [`STATUS_UNREADABLE`]
    pub status: Option<String>,
    /// False when the index has a record but the document is missing or
    /// does not parse
    pub consistent: bool,
}

/// Identity, name and location of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowLocation {
    /// Workflow identity
    pub id: WorkflowId,
    /// Display name
    pub name: String,
    /// Canonical location
    pub location: String,
}

/// A workflow as stored: record plus raw content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredWorkflow {
    /// Identity, name and location
    pub location: WorkflowLocation,
    /// Document text as committed
    pub content: String,
}

impl StoredWorkflow {
    /// Parse the stored content
    pub fn document(&self) -> Result<WorkflowDocument> {
        WorkflowDocument::from_yaml(&self.content)
    }
}

/// The versioned workflow store
pub struct WorkflowStore {
    content: ContentRoot,
    revisions: Arc<dyn RevisionStore>,
    index: Arc<dyn MetadataIndex>,
    marker_policy: ModifiedMarkerPolicy,
    /// Guards name checks and index writes
    creation_lock: Mutex<()>,
    identity_locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for WorkflowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStore")
            .field("content", &self.content)
            .field("marker_policy", &self.marker_policy)
            .finish_non_exhaustive()
    }
}

impl WorkflowStore {
    /// Assemble a store from its collaborators
    ///
    /// Call [`ensure_initialized`](Self::ensure_initialized) before use.
    pub fn new(
        content: ContentRoot,
        revisions: Arc<dyn RevisionStore>,
        index: Arc<dyn MetadataIndex>,
    ) -> Self {
        Self {
            content,
            revisions,
            index,
            marker_policy: ModifiedMarkerPolicy::default(),
            creation_lock: Mutex::new(()),
            identity_locks: DashMap::new(),
        }
    }

    /// Set the status marker policy
    pub fn with_marker_policy(mut self, policy: ModifiedMarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    /// Open a git-backed store with a JSON metadata index, initializing the
    /// repository if needed
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let content = ContentRoot::new(&config.root, &config.extension);
        let revisions = Arc::new(GitRevisionStore::new(&config.root, config.author.clone()));
        let index = Arc::new(FileMetadataIndex::open(config.index_path())?);

        let store = Self::new(content, revisions, index).with_marker_policy(config.modified_marker);
        store.ensure_initialized()?;
        Ok(store)
    }

    /// Create the content root and revision backend; idempotent
    pub fn ensure_initialized(&self) -> Result<()> {
        self.content.ensure_exists()?;
        self.revisions.ensure_initialized()
    }

    /// The content root
    pub fn content_root(&self) -> &ContentRoot {
        &self.content
    }

    /// A parser resolving references under the content root and sub-workflow
    /// names through the metadata index
    pub fn parser(&self) -> Result<DefinitionParser> {
        Ok(DefinitionParser::new(self.content.path())?
            .with_linker(IndexLinker::new(Arc::clone(&self.index))))
    }

    fn identity_lock(&self, id: &WorkflowId) -> Arc<Mutex<()>> {
        self.identity_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `operation` holding the lock of `id`
    ///
    /// The lock entry is dropped afterwards unless another caller holds a
    /// handle to it.
    fn with_identity_lock<T>(
        &self,
        id: &WorkflowId,
        operation: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let lock = self.identity_lock(id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            operation()
        };
        // One handle in the map, one here
        self.identity_locks
            .remove_if(id, |_, entry| Arc::strong_count(entry) <= 2);
        result
    }

    fn location_of(&self, id: &WorkflowId, name: String) -> WorkflowLocation {
        WorkflowLocation {
            id: id.clone(),
            name,
            location: self.content.canonical_location(id),
        }
    }

    /// Create or update a workflow
    ///
    /// An identity in the document's `workflow.uuid` means update; its
    /// absence means create. `prior_location` names the file the caller
    /// loaded the document from; when it differs from the canonical
    /// location, the old file is removed in the same revision.
    pub fn save(
        &self,
        name: &str,
        content: &str,
        prior_location: Option<&str>,
    ) -> Result<SaveOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlowkeepError::ParseFailure(
                "workflow display name cannot be empty".to_string(),
            ));
        }
        if let Some(prior) = prior_location {
            self.content.validate_location(prior)?;
        }

        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| FlowkeepError::ParseFailure(format!("invalid YAML: {e}")))?;
        let document = WorkflowDocument::from_value(value.clone())?;

        match document.workflow.uuid {
            Some(id) => self.with_identity_lock(&id.clone(), || {
                self.save_locked(name, content, value, Some(id), prior_location)
            }),
            None => self.save_locked(name, content, value, None, prior_location),
        }
    }

    fn save_locked(
        &self,
        name: &str,
        content: &str,
        value: Value,
        existing: Option<WorkflowId>,
        prior_location: Option<&str>,
    ) -> Result<SaveOutcome> {
        let created = existing.is_none();
        let id = existing.unwrap_or_default();
        let location = self.content.canonical_location(&id);

        let migrating_from = prior_location
            .filter(|prior| *prior != location)
            .map(|prior| self.content.exists(prior).map(|exists| exists.then_some(prior)))
            .transpose()?
            .flatten();

        let stored = match migrating_from {
            Some(prior) => {
                let previous = self.content.read(prior)?;
                let claimed = WorkflowDocument::from_yaml(&previous)
                    .ok()
                    .and_then(|doc| doc.workflow.uuid);
                if let Some(owner) = claimed.filter(|owner| *owner != id) {
                    return Err(FlowkeepError::Conflict(format!(
                        "{prior} belongs to workflow {owner}"
                    )));
                }
                Some(previous)
            }
            None if !created && self.content.exists(&location)? => {
                Some(self.content.read(&location)?)
            }
            None => None,
        };

        let Value::Mapping(mut root) = value else {
            return Err(FlowkeepError::ParseFailure(
                "document must be a mapping with a 'workflow' section".to_string(),
            ));
        };

        let changed = match &stored {
            Some(previous) => !same_ignoring_status(previous, &root),
            None => true,
        };
        let stamp_modified = match self.marker_policy {
            ModifiedMarkerPolicy::Never => false,
            ModifiedMarkerPolicy::OnChange => changed,
            ModifiedMarkerPolicy::Always => true,
        };

        let rewritten = edit_workflow_section(&mut root, |section| {
            let mut touched = set_string(section, NAME_KEY, name);
            if created {
                touched |= set_string(section, UUID_KEY, id.as_str());
            }
            if stamp_modified {
                touched |= set_string(section, STATUS_KEY, STATUS_MODIFIED);
            }
            touched
        });

        let final_content = if rewritten {
            let (marker, _) = submission::split_online_marker(content);
            let body = serde_yaml::to_string(&Value::Mapping(root))?;
            match marker {
                Some(marker) => format!("{marker}\n{body}"),
                None => body,
            }
        } else {
            content.to_string()
        };

        {
            let _names = self.creation_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(prior) = migrating_from {
                if let Some(owner) = self.indexed_owner(prior)? {
                    return Err(FlowkeepError::Conflict(format!(
                        "{prior} is the location of workflow {owner}"
                    )));
                }
            }
            if let Some(owner) = self.index.find_by_name(name)? {
                if created || owner.id != id {
                    return Err(FlowkeepError::name_conflict(name));
                }
            }
            if !created && self.index.get(&id)?.is_none() {
                tracing::info!("Adopting unindexed workflow {} as '{}'", id, name);
            }
            self.index.upsert(WorkflowRecord::new(id.clone(), name))?;
        }

        self.content.write(&location, &final_content)?;

        let (message, paths) = match migrating_from {
            Some(prior) => {
                self.content.remove(prior)?;
                tracing::info!("Migrating workflow '{}' from {} to {}", name, prior, location);
                (
                    format!("Migrate and update workflow {name} to UUID-based storage"),
                    vec![location.as_str(), prior],
                )
            }
            None if created => (format!("Create workflow {name}"), vec![location.as_str()]),
            None => (format!("Update workflow {name}"), vec![location.as_str()]),
        };

        let revision = self.revisions.commit(&paths, &message)?;
        if revision.is_none() {
            tracing::debug!("Save of '{}' left {} unchanged", name, location);
        }

        Ok(SaveOutcome {
            id,
            location,
            created,
            revision,
        })
    }

    /// The indexed workflow whose canonical location is `location`
    fn indexed_owner(&self, location: &str) -> Result<Option<WorkflowId>> {
        let suffix = format!(".{}", self.content.extension());
        let Some(owner) = location
            .strip_suffix(&suffix)
            .and_then(|stem| WorkflowId::from_string(stem).ok())
        else {
            return Ok(None);
        };
        Ok(self.index.get(&owner)?.map(|_| owner))
    }

    /// Every indexed workflow, with drift between index and files flagged
    pub fn list(&self) -> Result<Vec<WorkflowSummary>> {
        let mut summaries = Vec::new();
        for record in self.index.list()? {
            let location = self.content.canonical_location(&record.id);
            let last_modified = self.content.modified(&location)?;

            let (status, consistent) = match last_modified {
                Some(_) => match self
                    .content
                    .read(&location)
                    .and_then(|text| WorkflowDocument::from_yaml(&text))
                {
                    Ok(doc) => {
                        let status = doc.workflow.local_status;
                        (Some(status.unwrap_or_else(|| STATUS_SYNCED.to_string())), true)
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Document {} of '{}' cannot be read: {}",
                            location,
                            record.name,
                            e
                        );
                        (Some(STATUS_UNREADABLE.to_string()), false)
                    }
                },
                None => {
                    tracing::warn!(
                        "Index record {} ('{}') has no document at {}",
                        record.id,
                        record.name,
                        location
                    );
                    (None, false)
                }
            };

            summaries.push(WorkflowSummary {
                consistent,
                id: record.id,
                name: record.name,
                location,
                last_modified,
                status,
            });
        }
        Ok(summaries)
    }

    /// Record and raw content of a workflow
    ///
    /// `NotFound` unless both the index record and the document exist.
    pub fn read(&self, id: &WorkflowId) -> Result<StoredWorkflow> {
        let record = self
            .index
            .get(id)?
            .ok_or_else(|| FlowkeepError::workflow_not_found(id))?;
        let location = self.location_of(id, record.name);
        let content = self
            .content
            .read(&location.location)
            .map_err(|e| match e {
                FlowkeepError::NotFound(_) => FlowkeepError::workflow_not_found(id),
                other => other,
            })?;
        Ok(StoredWorkflow { location, content })
    }

    /// The parsed document of a workflow
    pub fn get(&self, id: &WorkflowId) -> Result<WorkflowDocument> {
        self.read(id)?.document()
    }

    /// The DAG view of a workflow's current content
    pub fn dag(&self, id: &WorkflowId) -> Result<DagView> {
        let stored = self.read(id)?;
        Ok(self.parser()?.parse(&stored.content))
    }

    /// Look up a workflow by display name
    pub fn find_by_name(&self, name: &str) -> Result<Option<WorkflowLocation>> {
        Ok(self
            .index
            .find_by_name(name)?
            .map(|record| self.location_of(&record.id, record.name)))
    }

    /// Remove a workflow's record and document
    ///
    /// Succeeds when either side exists, logging the asymmetry; `NotFound`
    /// when neither does. Returns the deleting revision, if one was made.
    pub fn delete(&self, id: &WorkflowId) -> Result<Option<RevisionId>> {
        self.with_identity_lock(id, || self.delete_locked(id))
    }

    fn delete_locked(&self, id: &WorkflowId) -> Result<Option<RevisionId>> {
        let location = self.content.canonical_location(id);
        let record = self.index.get(id)?;
        let file_exists = self.content.exists(&location)?;

        match (&record, file_exists) {
            (None, false) => return Err(FlowkeepError::workflow_not_found(id)),
            (None, true) => tracing::warn!("Deleting {} which has no index record", location),
            (Some(r), false) => {
                tracing::warn!("Deleting record of '{}' whose document {} is missing", r.name, location)
            }
            (Some(_), true) => {}
        }

        if record.is_some() {
            let _names = self.creation_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.index.remove(id)?;
        }

        if !file_exists {
            return Ok(None);
        }

        self.content.remove(&location)?;
        let label = record.map(|r| r.name).unwrap_or_else(|| location.clone());
        self.revisions
            .commit(&[location.as_str()], &format!("Delete workflow {label}"))
    }
}

/// Apply `edit` to the `workflow` section, creating it if needed; returns
/// whether anything changed
fn edit_workflow_section(root: &mut Mapping, edit: impl FnOnce(&mut Mapping) -> bool) -> bool {
    match root.get_mut(WORKFLOW_KEY) {
        Some(Value::Mapping(section)) => edit(section),
        Some(other) => {
            let mut section = Mapping::new();
            edit(&mut section);
            *other = Value::Mapping(section);
            true
        }
        None => {
            let mut section = Mapping::new();
            edit(&mut section);
            root.insert(Value::from(WORKFLOW_KEY), Value::Mapping(section));
            true
        }
    }
}

/// Set `key` to `value`, keeping its position; returns whether it changed
fn set_string(section: &mut Mapping, key: &str, value: &str) -> bool {
    if section.get(key).and_then(Value::as_str) == Some(value) {
        return false;
    }
    section.insert(Value::from(key), Value::from(value));
    true
}

/// Compare stored text with an incoming document, ignoring the status marker
fn same_ignoring_status(stored: &str, incoming: &Mapping) -> bool {
    let Ok(Value::Mapping(mut stored)) = serde_yaml::from_str::<Value>(stored) else {
        return false;
    };
    let mut incoming = incoming.clone();
    for root in [&mut stored, &mut incoming] {
        if let Some(Value::Mapping(section)) = root.get_mut(WORKFLOW_KEY) {
            section.shift_remove(STATUS_KEY);
        }
    }
    stored == incoming
}
