// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::model::{CompiledTask, TaskSpec};
use crate::context::{Condition, ContextSnapshot, Value};
use crate::dag::status::TaskStatus;
use crate::engine::TaskId;
use crate::errors::TaskError;
use crate::types::Priority;

/// Static task information derived from the validated definition, plus
/// per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    /// Insertion index in the definition; the last tie-breaker on admission.
    pub index: usize,
    pub task_type: String,
    pub priority: Priority,
    /// Direct dependencies (merged from the task and the dependency map).
    pub deps: Vec<TaskId>,
    pub depth: usize,
    pub max_retries: u32,
    pub allow_failure: bool,
    pub condition: Option<Condition>,
    pub skip_on_condition: bool,
    pub timeout: Option<Duration>,
    pub compensation_task_id: Option<TaskId>,
    pub compensable: bool,
    /// Only ever runs as another task's compensation.
    pub compensation_only: bool,
    pub input: Arc<BTreeMap<String, Value>>,

    pub status: TaskStatus,
    /// Retries consumed in the current run.
    pub retry_count: u32,
    /// Attempts started in the current run.
    pub attempts: u32,
    /// Requeued but still inside its backoff delay.
    pub held_for_backoff: bool,
    /// Terminal failure that dependents may treat as satisfied.
    pub tolerated: bool,
    pub outputs: BTreeMap<String, Value>,
    pub last_error: Option<TaskError>,
}

impl TaskInfo {
    pub fn from_spec(
        index: usize,
        spec: &TaskSpec,
        compiled: &CompiledTask,
        depth: usize,
    ) -> Self {
        Self {
            id: spec.id.clone(),
            index,
            task_type: spec.task_type.clone(),
            priority: spec.priority,
            deps: spec.dependencies.clone(),
            depth,
            max_retries: spec.max_retries,
            allow_failure: spec.allow_failure,
            condition: compiled.condition.clone(),
            skip_on_condition: spec.skip_on_condition,
            timeout: compiled.timeout,
            compensation_task_id: spec.compensation_task_id.clone(),
            compensable: spec.compensable,
            compensation_only: compiled.compensation_only,
            input: Arc::new(spec.input.clone()),
            status: TaskStatus::Pending,
            retry_count: 0,
            attempts: 0,
            held_for_backoff: false,
            tolerated: false,
            outputs: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Forget everything about the previous run.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.retry_count = 0;
        self.attempts = 0;
        self.held_for_backoff = false;
        self.tolerated = false;
        self.outputs.clear();
        self.last_error = None;
    }

    /// Whether dependents may consider this task done.
    pub fn satisfies_dependents(&self) -> bool {
        match self.status {
            TaskStatus::Completed | TaskStatus::Skipped => true,
            TaskStatus::Failed => self.tolerated,
            _ => false,
        }
    }

    /// Whether dependents can never run because of this task.
    pub fn blocks_dependents(&self) -> bool {
        match self.status {
            TaskStatus::Cancelled => true,
            TaskStatus::Failed => !self.tolerated,
            _ => false,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            status: self.status,
            retry_count: self.retry_count,
            attempts: self.attempts,
            outputs: self.outputs.clone(),
            last_error: self.last_error.as_ref().map(ToString::to_string),
        }
    }
}

/// A task handed to the executor for one attempt.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task_id: TaskId,
    pub task_type: String,
    /// 1-based attempt number within the current run.
    pub attempt: u32,
    pub input: Arc<BTreeMap<String, Value>>,
    pub context: ContextSnapshot,
    pub timeout: Option<Duration>,
    /// Set when this attempt compensates the named completed task.
    pub compensates: Option<TaskId>,
}

/// Public, read-only view of a task's per-run state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub retry_count: u32,
    pub attempts: u32,
    pub outputs: BTreeMap<String, Value>,
    pub last_error: Option<String>,
}
