// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Duration;

use tracing::debug;

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, WorkflowStatus};
use crate::engine::{ControlCommand, TaskId, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Deliver `RetryDue { task }` back to the core after `delay`.
    ScheduleRetry { task: TaskId, delay: Duration },
    /// Signal cancellation to every running handler.
    CancelRunning,
    /// The workflow reached a terminal state.
    Finished(WorkflowStatus),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn dispatched(&self) -> Vec<&ScheduledTask> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl From<SchedulerStep> for CoreStep {
    /// Cancellation goes out before new work so that handlers dispatched in
    /// the same step never see a stale signal.
    fn from(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if step.cancel_running {
            commands.push(CoreCommand::CancelRunning);
        }
        for retry in step.retries {
            commands.push(CoreCommand::ScheduleRetry {
                task: retry.task_id,
                delay: retry.delay,
            });
        }
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
        }
        let keep_running = step.finished.is_none();
        if let Some(status) = step.finished {
            commands.push(CoreCommand::Finished(status));
        }
        CoreStep {
            commands,
            keep_running,
        }
    }
}

pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    scheduler.start().into()
}

pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    attempt: u32,
    outcome: TaskOutcome,
) -> CoreStep {
    debug!(task = %task, attempt, "core: task completed");
    scheduler.handle_completion(&task, attempt, outcome).into()
}

pub fn handle_retry_due(scheduler: &mut Scheduler, task: TaskId) -> CoreStep {
    scheduler.retry_due(&task).into()
}

pub fn handle_control(scheduler: &mut Scheduler, command: ControlCommand) -> CoreStep {
    debug!(?command, status = %scheduler.status(), "core: control command");
    let step = match command {
        ControlCommand::Pause => scheduler.pause(),
        ControlCommand::Resume => scheduler.resume(),
        ControlCommand::Cancel => scheduler.cancel(),
    };
    step.into()
}
