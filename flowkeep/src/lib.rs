//! # Flowkeep
//!
//! A versioned store for declarative workflow definitions.
//!
//! ## Features
//!
//! - **Identity-preserving storage**: every workflow gets a stable identity and
//!   keeps it across renames, restores and reverts
//! - **Full history**: every change is a git revision; deleted workflows can be
//!   listed and brought back
//! - **DAG extraction**: documents are parsed into tasks and dependency
//!   relations, with `$FILE{}` references resolved against the content root
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowkeep::{StoreConfig, WorkflowStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = WorkflowStore::open(&StoreConfig::with_root("./workflows"))?;
//!
//! let saved = store.save(
//!     "daily-export",
//!     "workflow:\n  name: daily-export\ntasks:\n  - name: extract\n",
//!     None,
//! )?;
//!
//! let view = store.dag(&saved.id)?;
//! println!("{} tasks", view.tasks.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Shared helpers
pub mod common;

/// Store configuration
pub mod config;

/// The directory holding workflow documents
pub mod content_root;

/// Error types
pub mod error;

/// Identity to display-name index
pub mod index;

/// Revision-tracked file backend
pub mod revision;

/// Security utilities for path validation and resource limits
pub mod security;

/// The versioned workflow store
pub mod store;

/// Workflow documents, references and DAG views
pub mod workflow;

pub use config::{CommitAuthor, ModifiedMarkerPolicy, StoreConfig};
pub use content_root::ContentRoot;
pub use error::{ErrorChain, ErrorKind, FlowkeepError, Result};
pub use index::{FileMetadataIndex, MemoryMetadataIndex, MetadataIndex, WorkflowRecord};
pub use revision::{GitRevisionStore, Revision, RevisionId, RevisionStore};
pub use store::{
    DeletedWorkflow, RestoreOutcome, SaveOutcome, StoredWorkflow, Submission, WorkflowLocation,
    WorkflowStore, WorkflowSummary,
};
pub use workflow::{DagView, DefinitionParser, WorkflowDocument, WorkflowId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DagView, DefinitionParser, ErrorKind, FlowkeepError, Result, RevisionId, StoreConfig,
        WorkflowDocument, WorkflowId, WorkflowStore,
    };
}
