//! Workflow definitions: identity, document model, references and DAG view
//!
//! ```
//! use flowkeep::workflow::{DefinitionParser, Relation};
//!
//! let parser = DefinitionParser::new(".").unwrap();
//! let view = parser.parse(
//!     "workflow:\n  name: demo\ntasks:\n  - name: a\n  - name: b\n    deps: [a]\n",
//! );
//! assert_eq!(view.relations, vec![Relation::new("a", "b")]);
//! ```

mod dag;
mod document;
mod id;
mod linker;
mod parser;
mod reference;

pub use dag::{DagIssue, DagView, Relation, ResolvedField, ResolvedTask};
pub use document::{
    Schedule, SwitchBranch, Task, TaskKind, WorkflowDocument, WorkflowMeta, STATUS_KEY,
    STATUS_MODIFIED, STATUS_SYNCED, UUID_KEY,
};
pub use id::WorkflowId;
pub use linker::{DeferredSubWorkflows, IndexLinker, SubWorkflowLink, SubWorkflowLinker, SubWorkflowRef};
pub use parser::DefinitionParser;
pub use reference::{FieldValue, ReferenceResolver, RESOURCES_DIR};
