// src/engine/core.rs

//! Synchronous heart of a workflow run.
//!
//! [`CoreRuntime`] wraps the [`Scheduler`] and turns every [`RuntimeEvent`]
//! (a finished attempt, an elapsed backoff, a pause/resume/cancel request)
//! into a [`CoreStep`]: the commands the async shell in
//! `engine::runtime` must carry out, plus whether the run is still live.
//! Nothing here awaits, spawns or sleeps, so tests can drive a run event by
//! event.

use crate::dag::{Scheduler, WorkflowSnapshot};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_control, handle_retry_due, handle_start, handle_task_completion,
};

/// Owns the scheduler for one run.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.scheduler.snapshot()
    }

    /// Start the workflow and return the first dispatch.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted {
                task,
                attempt,
                outcome,
            } => handle_task_completion(&mut self.scheduler, task, attempt, outcome),
            RuntimeEvent::RetryDue { task } => handle_retry_due(&mut self.scheduler, task),
            RuntimeEvent::Control(command) => handle_control(&mut self.scheduler, command),
        }
    }
}
