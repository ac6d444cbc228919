//! Definition parser
//!
//! Turns document text into a [`DagView`]: schedule, tasks with their fields
//! resolved and tagged, and the dependency relations.

use super::dag::{self, DagIssue, DagView, ResolvedField, ResolvedTask};
use super::document::{Schedule, Task, WorkflowDocument};
use super::linker::{DeferredSubWorkflows, SubWorkflowLinker};
use super::reference::{FieldValue, ReferenceResolver};
use crate::error::Result;
use serde_yaml::Value;
use std::path::PathBuf;

/// Parses workflow documents into DAG views
pub struct DefinitionParser {
    resolver: ReferenceResolver,
    linker: Box<dyn SubWorkflowLinker>,
}

impl std::fmt::Debug for DefinitionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionParser")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl DefinitionParser {
    /// Parser resolving references under `search_root`, with sub-workflow
    /// linking deferred
    pub fn new(search_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            resolver: ReferenceResolver::new(search_root)?,
            linker: Box::new(DeferredSubWorkflows),
        })
    }

    /// Replace the sub-workflow linker
    pub fn with_linker(mut self, linker: impl SubWorkflowLinker + 'static) -> Self {
        self.linker = Box::new(linker);
        self
    }

    /// The reference resolver in use
    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    /// Parse document text, never failing
    ///
    /// Malformed content yields an empty view carrying a `ParseFailure` issue.
    pub fn parse(&self, content: &str) -> DagView {
        match WorkflowDocument::from_yaml(content) {
            Ok(doc) => self.view(&doc),
            Err(e) => {
                tracing::warn!("Failed to parse workflow document: {}", e);
                DagView::failed(e.to_string())
            }
        }
    }

    /// Parse document text, surfacing structural failures as errors
    pub fn try_parse(&self, content: &str) -> Result<DagView> {
        Ok(self.view(&WorkflowDocument::from_yaml(content)?))
    }

    /// Build the view of an already parsed document
    pub fn view(&self, doc: &WorkflowDocument) -> DagView {
        let mut issues = Vec::new();
        let tasks = doc
            .tasks
            .iter()
            .map(|task| self.resolve_task(task, &mut issues))
            .collect();

        let derived = dag::derive(&doc.tasks, self.linker.as_ref());
        issues.extend(derived.issues);

        DagView {
            schedule: doc
                .workflow
                .schedule
                .as_ref()
                .and_then(Schedule::expression)
                .map(str::to_string),
            tasks,
            relations: derived.relations,
            issues,
            sub_workflows: derived.sub_workflows,
        }
    }

    fn resolve_task(&self, task: &Task, issues: &mut Vec<DagIssue>) -> ResolvedTask {
        let fields = task
            .fields
            .iter()
            .map(|(key, value)| {
                let key = field_name(key);
                let value = self.resolver.resolve_field(value);
                if let FieldValue::Error { reference, .. } = &value {
                    issues.push(DagIssue::UnresolvedReference {
                        task: task.name.clone(),
                        field: key.clone(),
                        reference: reference.clone(),
                    });
                }
                ResolvedField { key, value }
            })
            .collect();

        ResolvedTask {
            name: task.name.clone(),
            task_type: task.task_type().map(str::to_string),
            fields,
        }
    }

    /// Copy of `doc` with every `$FILE{}` field replaced by the file content
    ///
    /// Unlike [`parse`](Self::parse), an unresolvable reference is an error.
    pub fn inline_references(&self, doc: &WorkflowDocument) -> Result<WorkflowDocument> {
        let mut inlined = doc.clone();
        for task in inlined.tasks.iter_mut() {
            let mut map = task.fields.clone();
            for (_, value) in map.iter_mut() {
                let reference = value
                    .as_str()
                    .and_then(|s| self.resolver.reference_in(s))
                    .map(str::to_string);
                if let Some(reference) = reference {
                    *value = Value::String(self.resolver.resolve(&reference)?);
                }
            }
            *task = Task::try_from(map)?;
        }
        Ok(inlined)
    }
}

fn field_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
