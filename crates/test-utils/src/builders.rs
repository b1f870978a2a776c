#![allow(dead_code)]

use flowdag::config::{RawWorkflowDefinition, TaskSpec, WorkflowDefinition};
use flowdag::types::{BackoffKind, ErrorStrategy, ExecutionMode, Priority, RetryBackoff};
use flowdag::{Value, Workflow};

/// Builder for `RawWorkflowDefinition` to simplify test setup.
pub struct WorkflowBuilder {
    raw: RawWorkflowDefinition,
}

impl WorkflowBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            raw: RawWorkflowDefinition::new(id),
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.raw.execution_mode = mode;
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.raw.max_parallel_tasks = n;
        self
    }

    pub fn strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.raw.error_strategy = strategy;
        self
    }

    pub fn continue_on_error(mut self, val: bool) -> Self {
        self.raw.continue_on_error = val;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.raw.max_retries = n;
        self
    }

    pub fn backoff(mut self, kind: BackoffKind, delay: &str) -> Self {
        self.raw.retry_backoff = Some(RetryBackoff {
            kind,
            delay: delay.to_string(),
            max_delay: None,
        });
        self
    }

    pub fn variable(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.raw.variables.insert(key.to_string(), value.into());
        self
    }

    /// Extra edge through the workflow-level dependency map.
    pub fn dependency(mut self, task: &str, depends_on: &str) -> Self {
        self.raw
            .dependencies
            .entry(task.to_string())
            .or_default()
            .push(depends_on.to_string());
        self
    }

    pub fn task(mut self, task: TaskSpec) -> Self {
        self.raw.tasks.push(task);
        self
    }

    pub fn build_raw(self) -> RawWorkflowDefinition {
        self.raw
    }

    pub fn build(self) -> WorkflowDefinition {
        WorkflowDefinition::try_from(self.raw).expect("Failed to build valid workflow from builder")
    }

    pub fn workflow(self) -> Workflow {
        Workflow::new(self.raw)
    }
}

/// Builder for `TaskSpec`.
pub struct TaskBuilder {
    task: TaskSpec,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: TaskSpec::new(id, "test"),
        }
    }

    pub fn task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.task.max_retries = n;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.task.allow_failure = true;
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.task.condition = Some(condition.to_string());
        self
    }

    pub fn wait_for_condition(mut self) -> Self {
        self.task.skip_on_condition = false;
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn compensated_by(mut self, task: &str) -> Self {
        self.task.compensation_task_id = Some(task.to_string());
        self
    }

    pub fn compensable(mut self) -> Self {
        self.task.compensable = true;
        self
    }

    pub fn input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.task.input.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

/// Shorthand for a plain task with the given dependencies.
pub fn task(id: &str, deps: &[&str]) -> TaskSpec {
    deps.iter()
        .fold(TaskBuilder::new(id), |b, dep| b.after(dep))
        .build()
}
