//! Dependency graph derived from a workflow document
//!
//! Edges come from two places, applied per task in document order:
//! each `deps` entry gives `dep -> task`, and each branch of a switch task
//! gives `task -> branch target`. Sub-workflow tasks are handed to a
//! [`SubWorkflowLinker`](super::SubWorkflowLinker).

use super::document::{Task, TaskKind};
use super::linker::{SubWorkflowLinker, SubWorkflowRef};
use super::reference::FieldValue;
use crate::security::MAX_WORKFLOW_COMPLEXITY;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A directed edge between two tasks
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Relation {
    /// Upstream task
    pub from: String,
    /// Downstream task
    pub to: String,
}

impl Relation {
    /// Create an edge
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// One field of a task after reference resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    /// Field name
    pub key: String,
    /// Value with provenance
    #[serde(flatten)]
    pub value: FieldValue,
}

/// A task as presented in the DAG view, every field kept
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTask {
    /// Task name
    pub name: String,
    /// Type label, if any
    pub task_type: Option<String>,
    /// All fields in document order
    pub fields: Vec<ResolvedField>,
}

impl ResolvedTask {
    /// Look up a field by name
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }
}

/// A structural problem found while parsing; reported, never fatal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DagIssue {
    /// The document could not be read at all
    ParseFailure {
        /// Parser message
        message: String,
    },
    /// Two tasks share a name
    DuplicateTask {
        /// The repeated name
        name: String,
    },
    /// A `deps` entry names no task in the document
    UnknownDependency {
        /// Task declaring the dependency
        task: String,
        /// The missing upstream name
        dependency: String,
    },
    /// A switch branch targets no task in the document
    UnknownBranchTarget {
        /// The switch task
        task: String,
        /// The missing branch target
        target: String,
    },
    /// The relations form a cycle
    Cycle {
        /// Task names along the cycle, first repeated at the end
        path: Vec<String>,
    },
    /// A `$FILE{}` reference did not resolve
    UnresolvedReference {
        /// Task owning the field
        task: String,
        /// Field name
        field: String,
        /// The reference as written
        reference: String,
    },
    /// The graph is too large to check for cycles
    TooComplex {
        /// Tasks plus relations
        size: usize,
    },
}

impl fmt::Display for DagIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DagIssue::ParseFailure { message } => write!(f, "parse failure: {message}"),
            DagIssue::DuplicateTask { name } => write!(f, "duplicate task name '{name}'"),
            DagIssue::UnknownDependency { task, dependency } => {
                write!(f, "task '{task}' depends on unknown task '{dependency}'")
            }
            DagIssue::UnknownBranchTarget { task, target } => {
                write!(f, "switch '{task}' branches to unknown task '{target}'")
            }
            DagIssue::Cycle { path } => write!(f, "dependency cycle: {}", path.join(" -> ")),
            DagIssue::UnresolvedReference {
                task,
                field,
                reference,
            } => write!(f, "task '{task}' field '{field}': unresolved reference '{reference}'"),
            DagIssue::TooComplex { size } => {
                write!(f, "graph of size {size} too large for cycle detection")
            }
        }
    }
}

/// Parser output: schedule, resolved tasks and relations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DagView {
    /// Cron expression, if the workflow is scheduled
    pub schedule: Option<String>,
    /// Tasks in document order
    pub tasks: Vec<ResolvedTask>,
    /// Edges, deduplicated, in derivation order
    pub relations: Vec<Relation>,
    /// Reportable structural issues
    pub issues: Vec<DagIssue>,
    /// Sub-workflow references seen while deriving edges
    pub sub_workflows: Vec<SubWorkflowRef>,
}

impl DagView {
    /// An empty view carrying a single parse failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            issues: vec![DagIssue::ParseFailure {
                message: message.into(),
            }],
            ..Self::default()
        }
    }

    /// True when no issues were found
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Look up a task by name
    pub fn task(&self, name: &str) -> Option<&ResolvedTask> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Relations, issues and sub-workflow references for a task list
#[derive(Debug, Default)]
pub(crate) struct Derived {
    pub relations: Vec<Relation>,
    pub issues: Vec<DagIssue>,
    pub sub_workflows: Vec<SubWorkflowRef>,
}

struct RelationSet {
    seen: HashSet<Relation>,
    ordered: Vec<Relation>,
}

impl RelationSet {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            ordered: Vec::new(),
        }
    }

    fn push(&mut self, relation: Relation) {
        if self.seen.insert(relation.clone()) {
            self.ordered.push(relation);
        }
    }
}

/// Derive edges and structural issues from `tasks`
pub(crate) fn derive(tasks: &[Task], linker: &dyn SubWorkflowLinker) -> Derived {
    let mut derived = Derived::default();
    let mut names = HashSet::new();
    for task in tasks {
        if !names.insert(task.name.as_str()) {
            derived.issues.push(DagIssue::DuplicateTask {
                name: task.name.clone(),
            });
        }
    }

    let mut relations = RelationSet::new();
    for task in tasks {
        for dep in &task.deps {
            if !names.contains(dep.as_str()) {
                derived.issues.push(DagIssue::UnknownDependency {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                });
            }
            relations.push(Relation::new(dep, &task.name));
        }

        match &task.kind {
            TaskKind::Switch { condition } => {
                for target in condition.iter().filter_map(|b| b.task.as_deref()) {
                    if !names.contains(target) {
                        derived.issues.push(DagIssue::UnknownBranchTarget {
                            task: task.name.clone(),
                            target: target.to_string(),
                        });
                    }
                    relations.push(Relation::new(&task.name, target));
                }
            }
            TaskKind::SubWorkflow { workflow_name } => {
                let link = linker.link(&task.name, workflow_name);
                for relation in link.relations {
                    relations.push(relation);
                }
                derived.sub_workflows.push(link.reference);
            }
            _ => {}
        }
    }
    derived.relations = relations.ordered;

    let size = tasks.len() + derived.relations.len();
    if size > MAX_WORKFLOW_COMPLEXITY {
        derived.issues.push(DagIssue::TooComplex { size });
    } else {
        let order: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
        for path in find_cycles(&order, &derived.relations) {
            derived.issues.push(DagIssue::Cycle { path });
        }
    }

    derived
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first cycle search, visiting nodes in document order so the
/// reported cycles are deterministic
fn find_cycles(order: &[&str], relations: &[Relation]) -> Vec<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for relation in relations {
        adjacency
            .entry(relation.from.as_str())
            .or_default()
            .push(relation.to.as_str());
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cycles = Vec::new();
    for &start in order {
        if !marks.contains_key(start) {
            let mut path = Vec::new();
            visit(start, &adjacency, &mut marks, &mut path, &mut cycles);
        }
    }
    cycles
}

fn visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    marks.insert(node, Mark::Visiting);
    path.push(node);

    for &next in adjacency.get(node).map(Vec::as_slice).unwrap_or_default() {
        match marks.get(next) {
            Some(Mark::Visiting) => {
                if let Some(pos) = path.iter().position(|n| *n == next) {
                    let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.to_string());
                    cycles.push(cycle);
                }
            }
            Some(Mark::Done) => {}
            None => visit(next, adjacency, marks, path, cycles),
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::document::WorkflowDocument;
    use crate::workflow::linker::DeferredSubWorkflows;

    fn derive_from(yaml: &str) -> Derived {
        let doc = WorkflowDocument::from_yaml(yaml).unwrap();
        derive(&doc.tasks, &DeferredSubWorkflows)
    }

    #[test]
    fn test_deps_edges_only_for_listed_deps() {
        let derived = derive_from(
            "tasks:\n  - name: a\n  - name: b\n  - name: t\n    deps: [a, b]\n  - name: u\n",
        );
        assert_eq!(
            derived.relations,
            vec![Relation::new("a", "t"), Relation::new("b", "t")]
        );
        assert!(derived.issues.is_empty());
    }

    #[test]
    fn test_switch_edges() {
        let derived = derive_from(
            r#"
tasks:
  - name: sw
    task_type: Switch
    condition:
      - task: big
        condition: "${x} > 1"
      - task: small
      - condition: "orphan branch"
  - name: big
  - name: small
"#,
        );
        assert_eq!(
            derived.relations,
            vec![Relation::new("sw", "big"), Relation::new("sw", "small")]
        );
    }

    #[test]
    fn test_unknown_targets_are_reported_but_kept() {
        let derived = derive_from(
            "tasks:\n  - name: a\n    deps: [ghost]\n  - name: sw\n    task_type: Switch\n    condition:\n      - task: phantom\n",
        );
        assert_eq!(derived.relations.len(), 2);
        assert_eq!(
            derived.issues,
            vec![
                DagIssue::UnknownDependency {
                    task: "a".into(),
                    dependency: "ghost".into()
                },
                DagIssue::UnknownBranchTarget {
                    task: "sw".into(),
                    target: "phantom".into()
                },
            ]
        );
    }

    #[test]
    fn test_duplicates_and_repeated_edges() {
        let derived = derive_from(
            "tasks:\n  - name: a\n  - name: a\n  - name: b\n    deps: [a, a]\n",
        );
        assert_eq!(derived.relations, vec![Relation::new("a", "b")]);
        assert_eq!(
            derived.issues,
            vec![DagIssue::DuplicateTask { name: "a".into() }]
        );
    }

    #[test]
    fn test_cycle_detection() {
        let derived = derive_from(
            "tasks:\n  - name: a\n    deps: [c]\n  - name: b\n    deps: [a]\n  - name: c\n    deps: [b]\n",
        );
        let cycles: Vec<_> = derived
            .issues
            .iter()
            .filter_map(|i| match i {
                DagIssue::Cycle { path } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(cycles, vec![vec!["a", "b", "c", "a"]]);
    }

    #[test]
    fn test_sub_workflow_is_deferred() {
        let derived = derive_from(
            "tasks:\n  - name: call\n    task_type: SubWorkflow\n    workflow_name: nightly\n",
        );
        assert!(derived.relations.is_empty());
        assert_eq!(derived.sub_workflows.len(), 1);
        assert_eq!(derived.sub_workflows[0].workflow_name, "nightly");
        assert_eq!(derived.sub_workflows[0].workflow_id, None);
    }

    #[test]
    fn test_issue_display() {
        let issue = DagIssue::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(issue.to_string(), "dependency cycle: a -> b -> a");
    }
}
