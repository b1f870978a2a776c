// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::time::Duration;

use crate::dag::status::WorkflowStatus;
use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskId;

/// A requeued task that must not be admitted before `delay` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub task_id: TaskId,
    pub delay: Duration,
}

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the scheduler and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Attempts admitted in this step, compensations included.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that failed terminally in this step.
    pub newly_failed: Vec<TaskId>,
    /// Backoff timers the shell has to arm.
    pub retries: Vec<RetryRequest>,
    /// Running handlers should be told to stop.
    pub cancel_running: bool,
    /// Set when the run reached a terminal state with nothing left running.
    pub finished: Option<WorkflowStatus>,
}

impl SchedulerStep {
    pub fn scheduled_ids(&self) -> Vec<&str> {
        self.newly_scheduled
            .iter()
            .map(|t| t.task_id.as_str())
            .collect()
    }
}
