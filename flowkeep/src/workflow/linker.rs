//! Sub-workflow linking
//!
//! A `SubWorkflow` task names another workflow by display name. How that
//! reference turns into graph structure is left to a [`SubWorkflowLinker`].

use super::dag::Relation;
use super::WorkflowId;
use crate::index::MetadataIndex;
use serde::Serialize;
use std::sync::Arc;

/// A sub-workflow task and what it points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubWorkflowRef {
    /// The task invoking the sub-workflow
    pub task: String,
    /// Display name of the invoked workflow
    pub workflow_name: String,
    /// Identity of the invoked workflow, when the linker looked it up
    pub workflow_id: Option<WorkflowId>,
}

/// What a linker contributes for one sub-workflow task
#[derive(Debug, Clone, PartialEq)]
pub struct SubWorkflowLink {
    /// The recorded reference
    pub reference: SubWorkflowRef,
    /// Extra edges to add to the view
    pub relations: Vec<Relation>,
}

/// Extension point for sub-workflow references
pub trait SubWorkflowLinker: Send + Sync {
    /// Link the sub-workflow `workflow_name` invoked by `task`
    fn link(&self, task: &str, workflow_name: &str) -> SubWorkflowLink;
}

/// Records the reference, contributes no edges
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredSubWorkflows;

impl SubWorkflowLinker for DeferredSubWorkflows {
    fn link(&self, task: &str, workflow_name: &str) -> SubWorkflowLink {
        SubWorkflowLink {
            reference: SubWorkflowRef {
                task: task.to_string(),
                workflow_name: workflow_name.to_string(),
                workflow_id: None,
            },
            relations: Vec::new(),
        }
    }
}

/// Resolves the invoked workflow's identity through the metadata index
///
/// Still contributes no edges.
pub struct IndexLinker {
    index: Arc<dyn MetadataIndex>,
}

impl IndexLinker {
    /// Create a linker over `index`
    pub fn new(index: Arc<dyn MetadataIndex>) -> Self {
        Self { index }
    }
}

impl std::fmt::Debug for IndexLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLinker").finish_non_exhaustive()
    }
}

impl SubWorkflowLinker for IndexLinker {
    fn link(&self, task: &str, workflow_name: &str) -> SubWorkflowLink {
        let mut link = DeferredSubWorkflows.link(task, workflow_name);
        match self.index.find_by_name(workflow_name) {
            Ok(Some(record)) => link.reference.workflow_id = Some(record.id),
            Ok(None) => {
                tracing::debug!("Sub-workflow '{}' of task '{}' not in index", workflow_name, task)
            }
            Err(e) => tracing::warn!("Index lookup for sub-workflow '{}' failed: {}", workflow_name, e),
        }
        link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemoryMetadataIndex, WorkflowRecord};

    #[test]
    fn test_index_linker_fills_identity() {
        let index = Arc::new(MemoryMetadataIndex::new());
        let id = WorkflowId::new();
        index
            .upsert(WorkflowRecord::new(id.clone(), "nightly"))
            .unwrap();

        let linker = IndexLinker::new(index);
        let found = linker.link("call", "nightly");
        assert_eq!(found.reference.workflow_id, Some(id));
        assert!(found.relations.is_empty());

        let missing = linker.link("call", "weekly");
        assert_eq!(missing.reference.workflow_id, None);
    }
}
