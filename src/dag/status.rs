// src/dag/status.rs

//! Workflow and task state machines.
//!
//! The transition tables here are the single definition of which moves are
//! legal. The scheduler consults them on every transition and panics on an
//! illegal one: that can only happen if the single-writer discipline of the
//! scheduler loop was broken.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    /// At least one dependency is unmet (or the run condition is not yet true).
    Waiting,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }

    /// Not started and not terminal.
    pub fn is_open(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Waiting | TaskStatus::Ready)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Waiting | Ready | Running | Skipped | Cancelled)
                | (Waiting, Ready | Skipped | Cancelled)
                // a context commit made the condition false before admission
                | (Ready, Running | Waiting | Skipped | Cancelled)
                | (Running, Completed | Failed | Cancelled)
                // per-task retry
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Waiting => "WAITING",
            TaskStatus::Ready => "READY",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
            TaskStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Draft,
    Validating,
    Ready,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Draft, Validating)
                | (Validating, Ready | Failed)
                | (Ready, Running | Cancelled)
                | (Running, Paused | Completed | Failed | Cancelled)
                | (Paused, Running | Completed | Failed | Cancelled)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Draft => "DRAFT",
            WorkflowStatus::Validating => "VALIDATING",
            WorkflowStatus::Ready => "READY",
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Paused => "PAUSED",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
            WorkflowStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_task_states_only_leave_through_retry() {
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
        for terminal in [TaskStatus::Completed, TaskStatus::Skipped, TaskStatus::Cancelled] {
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Failed,
                TaskStatus::Completed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn running_cannot_be_reached_without_ready_except_from_pending() {
        assert!(!TaskStatus::Waiting.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Ready.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn ready_task_can_fall_back_when_its_condition_turns_false() {
        assert!(TaskStatus::Ready.can_transition_to(TaskStatus::Skipped));
        assert!(TaskStatus::Ready.can_transition_to(TaskStatus::Waiting));
        assert!(!TaskStatus::Ready.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn workflow_pause_cycle_and_terminals() {
        assert!(WorkflowStatus::Running.can_transition_to(WorkflowStatus::Paused));
        assert!(WorkflowStatus::Paused.can_transition_to(WorkflowStatus::Running));
        assert!(!WorkflowStatus::Validating.can_transition_to(WorkflowStatus::Running));
        assert!(!WorkflowStatus::Completed.can_transition_to(WorkflowStatus::Cancelled));
        assert!(WorkflowStatus::Failed.is_terminal());
    }
}
