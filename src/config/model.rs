// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{Condition, Value};
use crate::dag::TaskGraph;
use crate::engine::TaskId;
use crate::policy::BackoffPolicy;
use crate::types::{ErrorStrategy, ExecutionMode, Priority, RetryBackoff};

/// A workflow definition as written by the caller (or read from TOML).
///
/// ```toml
/// id = "nightly-report"
/// execution_mode = "parallel"
/// max_parallel_tasks = 4
/// error_strategy = "rollback"
/// max_retries = 1
///
/// [variables]
/// region = "eu"
///
/// [dependencies]
/// render = ["extract"]
///
/// [[task]]
/// id = "extract"
/// type = "sql"
/// priority = "high"
/// max_retries = 2
/// timeout = "30s"
/// compensation_task_id = "drop_staging"
///
/// [[task]]
/// id = "render"
/// type = "template"
/// condition = "rows > 0"
///
/// [[task]]
/// id = "drop_staging"
/// type = "sql"
/// ```
///
/// Nothing here is checked until the workflow is validated; see
/// [`WorkflowDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWorkflowDefinition {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Upper bound on concurrently running tasks for `parallel`, `hybrid`
    /// and `dynamic` modes.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    #[serde(default)]
    pub error_strategy: ErrorStrategy,

    /// When true, task failures are recorded but never fail the workflow.
    #[serde(default)]
    pub continue_on_error: bool,

    /// How many times the *whole run* may be restarted after it failed.
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<RetryBackoff>,

    /// Initial run context of every run.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,

    /// Extra dependency edges: `task -> [tasks it depends on]`.
    #[serde(default)]
    pub dependencies: BTreeMap<TaskId, Vec<TaskId>>,

    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskSpec>,
}

fn default_max_parallel_tasks() -> usize {
    4
}

impl RawWorkflowDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            execution_mode: ExecutionMode::default(),
            max_parallel_tasks: default_max_parallel_tasks(),
            error_strategy: ErrorStrategy::default(),
            continue_on_error: false,
            max_retries: 0,
            retry_backoff: None,
            variables: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub id: TaskId,

    /// Opaque label for the handler; the engine never interprets it.
    #[serde(default, rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub max_retries: u32,

    /// A failure of this task never fails the workflow, and its dependents
    /// still run as if it had been skipped.
    #[serde(default)]
    pub allow_failure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// With a false condition: skip at once (`true`) or keep waiting for the
    /// context to change (`false`).
    #[serde(default = "default_true")]
    pub skip_on_condition: bool,

    /// Deadline per attempt, e.g. `"30s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_task_id: Option<TaskId>,

    /// Eligible for compensation under the `compensate` strategy.
    #[serde(default)]
    pub compensable: bool,

    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    #[serde(default)]
    pub input: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            priority: Priority::default(),
            max_retries: 0,
            allow_failure: false,
            condition: None,
            skip_on_condition: true,
            timeout: None,
            compensation_task_id: None,
            compensable: false,
            dependencies: Vec::new(),
            input: BTreeMap::new(),
        }
    }
}

/// Per-task facts derived during validation, stored parallel to the graph.
#[derive(Debug, Clone)]
pub struct CompiledTask {
    pub condition: Option<Condition>,
    pub timeout: Option<Duration>,
    /// Referenced as another task's compensation; never scheduled normally.
    pub compensation_only: bool,
}

/// A validated, frozen workflow definition.
///
/// Obtained through `WorkflowDefinition::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    raw: RawWorkflowDefinition,
    graph: TaskGraph,
    compiled: Vec<CompiledTask>,
    backoff: Option<BackoffPolicy>,
}

impl WorkflowDefinition {
    pub(crate) fn new_unchecked(
        raw: RawWorkflowDefinition,
        graph: TaskGraph,
        compiled: Vec<CompiledTask>,
        backoff: Option<BackoffPolicy>,
    ) -> Self {
        Self {
            raw,
            graph,
            compiled,
            backoff,
        }
    }

    pub fn id(&self) -> &str {
        &self.raw.id
    }

    /// The definition as submitted (dependencies not merged).
    pub fn raw(&self) -> &RawWorkflowDefinition {
        &self.raw
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Compiled facts for the task at graph insertion index `i`.
    pub fn compiled(&self, i: usize) -> &CompiledTask {
        &self.compiled[i]
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.raw.execution_mode
    }

    pub fn max_parallel_tasks(&self) -> usize {
        self.raw.max_parallel_tasks
    }

    pub fn error_strategy(&self) -> ErrorStrategy {
        self.raw.error_strategy
    }

    pub fn continue_on_error(&self) -> bool {
        self.raw.continue_on_error
    }

    pub fn max_retries(&self) -> u32 {
        self.raw.max_retries
    }

    pub fn backoff(&self) -> Option<&BackoffPolicy> {
        self.backoff.as_ref()
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.raw.variables
    }
}
