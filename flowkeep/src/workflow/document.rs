//! Workflow document model
//!
//! A document has a `workflow` section (metadata) and a `tasks` sequence.
//! Known task types get typed parameters, and every key the model does not
//! know lands in an `extra` mapping. Each task also keeps its fields exactly
//! as written, which is what gets serialized back.

use super::WorkflowId;
use crate::error::{FlowkeepError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Key of the identity inside the `workflow` section
pub const UUID_KEY: &str = "uuid";
/// Key of the free-form status marker inside the `workflow` section
pub const STATUS_KEY: &str = "local_status";
/// Status marker written by `save`
pub const STATUS_MODIFIED: &str = "modified";
/// Status marker written after a submission
pub const STATUS_SYNCED: &str = "synced";

const WORKFLOW_KEY: &str = "workflow";
const TASKS_KEY: &str = "tasks";
const NAME_KEY: &str = "name";
const SCHEDULE_KEY: &str = "schedule";
const TYPE_KEY: &str = "task_type";
const DEPS_KEY: &str = "deps";

fn key(k: &str) -> Value {
    Value::String(k.to_string())
}

/// Scalars read where a name is expected; `name: 1` means the task "1"
fn scalar_string(value: Value) -> std::result::Result<String, Value> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(other),
    }
}

fn take_string(map: &mut Mapping, k: &str, context: &str) -> Result<Option<String>> {
    match map.shift_remove(k) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_string(value).map(Some).map_err(|other| {
            FlowkeepError::ParseFailure(format!(
                "{context}: '{k}' must be a string, found {other:?}"
            ))
        }),
    }
}

/// Take a typed string parameter only when it has the expected shape;
/// anything else stays in the map
fn take_param(map: &mut Mapping, k: &str) -> Option<String> {
    match map.get(k) {
        Some(Value::String(_)) => match map.shift_remove(k) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn into_mapping(value: Value, context: &str) -> Result<Mapping> {
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => Ok(map),
        Value::Tagged(tagged) => into_mapping(tagged.value, context),
        other => Err(FlowkeepError::ParseFailure(format!(
            "{context} must be a mapping, found {other:?}"
        ))),
    }
}

/// `schedule` is either a cron string or a mapping carrying `crontab`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schedule {
    /// `schedule: "0 0 * * *"`
    Expression(String),
    /// `schedule: { crontab: "0 0 * * *", ... }`
    Detailed(Mapping),
}

impl Schedule {
    /// The cron expression, if one is present
    pub fn expression(&self) -> Option<&str> {
        match self {
            Schedule::Expression(s) => Some(s.as_str()),
            Schedule::Detailed(map) => map.get("crontab").and_then(Value::as_str),
        }
    }
}

/// The `workflow` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Mapping", into = "Mapping")]
pub struct WorkflowMeta {
    /// Display name
    pub name: Option<String>,
    /// Identity, absent until the first save
    pub uuid: Option<WorkflowId>,
    /// Schedule, if any
    pub schedule: Option<Schedule>,
    /// Free-form status marker (`modified`, `synced`, ...)
    pub local_status: Option<String>,
    /// Every other key, verbatim
    pub extra: Mapping,
}

impl TryFrom<Mapping> for WorkflowMeta {
    type Error = FlowkeepError;

    fn try_from(mut map: Mapping) -> Result<Self> {
        const CONTEXT: &str = "workflow section";
        let name = take_string(&mut map, NAME_KEY, CONTEXT)?;
        let uuid = take_string(&mut map, UUID_KEY, CONTEXT)?
            .map(WorkflowId::from_string)
            .transpose()
            .map_err(|e| FlowkeepError::ParseFailure(format!("{CONTEXT}: {e}")))?;
        let schedule = match map.shift_remove(SCHEDULE_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_yaml::from_value(value).map_err(|e| {
                FlowkeepError::ParseFailure(format!("{CONTEXT}: invalid schedule: {e}"))
            })?),
        };
        let local_status = take_string(&mut map, STATUS_KEY, CONTEXT)?;
        Ok(Self {
            name,
            uuid,
            schedule,
            local_status,
            extra: map,
        })
    }
}

impl From<WorkflowMeta> for Mapping {
    fn from(meta: WorkflowMeta) -> Self {
        let mut map = Mapping::new();
        if let Some(name) = meta.name {
            map.insert(key(NAME_KEY), Value::String(name));
        }
        if let Some(uuid) = meta.uuid {
            map.insert(key(UUID_KEY), Value::String(uuid.into()));
        }
        if let Some(schedule) = meta.schedule {
            let value = match schedule {
                Schedule::Expression(s) => Value::String(s),
                Schedule::Detailed(m) => Value::Mapping(m),
            };
            map.insert(key(SCHEDULE_KEY), value);
        }
        if let Some(status) = meta.local_status {
            map.insert(key(STATUS_KEY), Value::String(status));
        }
        map.extend(meta.extra);
        map
    }
}

/// One branch of a switch task's `condition` list
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchBranch {
    /// Task run when the branch is taken
    pub task: Option<String>,
    /// Branch condition expression; `None` for the default branch
    pub condition: Option<String>,
    /// Other branch keys
    pub extra: Mapping,
}

impl SwitchBranch {
    fn from_value(value: Value) -> Result<Self> {
        const CONTEXT: &str = "switch branch";
        let mut map = into_mapping(value, CONTEXT)?;
        Ok(Self {
            task: take_string(&mut map, "task", CONTEXT)?,
            condition: take_string(&mut map, "condition", CONTEXT)?,
            extra: map,
        })
    }
}

/// Typed parameters of the task types the model knows
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// `task_type: Shell`
    Shell {
        /// Shell command
        command: String,
    },
    /// `task_type: Python`
    Python {
        /// Python source
        definition: String,
    },
    /// `task_type: Sql`
    Sql {
        /// SQL statement
        sql: String,
    },
    /// `task_type: Http`
    Http {
        /// Request URL
        url: String,
    },
    /// `task_type: Switch`
    Switch {
        /// Branches, in document order
        condition: Vec<SwitchBranch>,
    },
    /// `task_type: SubWorkflow`
    SubWorkflow {
        /// Display name of the referenced workflow
        workflow_name: String,
    },
    /// Any other type, or a known type missing its typed parameter
    Other {
        /// The type label as written
        task_type: Option<String>,
    },
}

impl TaskKind {
    /// Canonical type label
    pub fn label(&self) -> Option<&str> {
        match self {
            TaskKind::Shell { .. } => Some("Shell"),
            TaskKind::Python { .. } => Some("Python"),
            TaskKind::Sql { .. } => Some("Sql"),
            TaskKind::Http { .. } => Some("Http"),
            TaskKind::Switch { .. } => Some("Switch"),
            TaskKind::SubWorkflow { .. } => Some("SubWorkflow"),
            TaskKind::Other { task_type } => task_type.as_deref(),
        }
    }

    fn from_fields(task_type: Option<String>, map: &mut Mapping) -> Result<Self> {
        let normalized = task_type
            .as_deref()
            .map(|t| t.to_ascii_lowercase().replace(['_', '-'], ""));

        let kind = match normalized.as_deref() {
            Some("shell") => take_param(map, "command").map(|command| TaskKind::Shell { command }),
            Some("python") => {
                take_param(map, "definition").map(|definition| TaskKind::Python { definition })
            }
            Some("sql") => take_param(map, "sql").map(|sql| TaskKind::Sql { sql }),
            Some("http") => take_param(map, "url").map(|url| TaskKind::Http { url }),
            Some("subworkflow") => take_param(map, "workflow_name")
                .map(|workflow_name| TaskKind::SubWorkflow { workflow_name }),
            Some("switch") => match map.get("condition") {
                Some(Value::Sequence(_)) | None => {
                    let branches = match map.shift_remove("condition") {
                        Some(Value::Sequence(seq)) => seq
                            .into_iter()
                            .map(SwitchBranch::from_value)
                            .collect::<Result<Vec<_>>>()?,
                        _ => Vec::new(),
                    };
                    Some(TaskKind::Switch {
                        condition: branches,
                    })
                }
                _ => None,
            },
            _ => None,
        };

        Ok(kind.unwrap_or(TaskKind::Other { task_type }))
    }
}

/// One entry of the `tasks` sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Mapping", into = "Mapping")]
pub struct Task {
    /// Task name, unique within the document
    pub name: String,
    /// Type and typed parameters
    pub kind: TaskKind,
    /// Upstream task names
    pub deps: Vec<String>,
    /// Keys the typed fields above do not cover
    pub extra: Mapping,
    /// Every field exactly as written, in document order
    pub fields: Mapping,
}

impl Task {
    /// The type label as it will be written back
    pub fn task_type(&self) -> Option<&str> {
        self.kind.label()
    }
}

impl TryFrom<Mapping> for Task {
    type Error = FlowkeepError;

    fn try_from(fields: Mapping) -> Result<Self> {
        let mut map = fields.clone();
        let name = take_string(&mut map, NAME_KEY, "task")?
            .ok_or_else(|| FlowkeepError::ParseFailure("task without a name".to_string()))?;
        let context = format!("task '{name}'");

        let deps = match map.shift_remove(DEPS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(seq)) => seq
                .into_iter()
                .map(|v| {
                    scalar_string(v).map_err(|other| {
                        FlowkeepError::ParseFailure(format!(
                            "{context}: deps entries must be task names, found {other:?}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(single @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
                scalar_string(single).into_iter().collect()
            }
            Some(other) => {
                return Err(FlowkeepError::ParseFailure(format!(
                    "{context}: deps must be a list, found {other:?}"
                )))
            }
        };

        let task_type = take_string(&mut map, TYPE_KEY, &context)?;
        let kind = TaskKind::from_fields(task_type, &mut map)?;

        Ok(Self {
            name,
            kind,
            deps,
            extra: map,
            fields,
        })
    }
}

impl From<Task> for Mapping {
    fn from(task: Task) -> Self {
        task.fields
    }
}

/// A whole workflow document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowDocument {
    /// The `workflow` section
    pub workflow: WorkflowMeta,
    /// The `tasks` sequence, in document order
    pub tasks: Vec<Task>,
    /// Other top-level keys
    pub extra: Mapping,
}

impl WorkflowDocument {
    /// Parse YAML text
    ///
    /// Missing `workflow` or `tasks` sections are treated as empty; any other
    /// structural problem is a `ParseFailure`.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| FlowkeepError::ParseFailure(format!("invalid YAML: {e}")))?;
        Self::from_value(value)
    }

    /// Build from an already-parsed YAML value
    pub fn from_value(value: Value) -> Result<Self> {
        let mut root = into_mapping(value, "document")?;

        let workflow = match root.shift_remove(WORKFLOW_KEY) {
            None => WorkflowMeta::default(),
            Some(v) => WorkflowMeta::try_from(into_mapping(v, "workflow section")?)?,
        };

        let tasks = match root.shift_remove(TASKS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(seq)) => seq
                .into_iter()
                .map(|v| Task::try_from(into_mapping(v, "task")?))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(FlowkeepError::ParseFailure(format!(
                    "tasks must be a list, found {other:?}"
                )))
            }
        };

        Ok(Self {
            workflow,
            tasks,
            extra: root,
        })
    }

    /// Convert back to a YAML value
    pub fn to_value(&self) -> Value {
        let mut root = Mapping::new();
        root.insert(
            key(WORKFLOW_KEY),
            Value::Mapping(self.workflow.clone().into()),
        );
        root.insert(
            key(TASKS_KEY),
            Value::Sequence(
                self.tasks
                    .iter()
                    .cloned()
                    .map(|t| Value::Mapping(t.into()))
                    .collect(),
            ),
        );
        root.extend(self.extra.clone());
        Value::Mapping(root)
    }

    /// Serialize to YAML text
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    /// Look up a task by name
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

impl Serialize for WorkflowDocument {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
