// src/engine/mod.rs

//! Orchestration engine for flowdag.
//!
//! This module ties together:
//! - the scheduler (readiness, admission, failure policy)
//! - the main runtime event loop that reacts to:
//!   - task completion events
//!   - backoff timers firing
//!   - control commands (pause / resume / cancel)
//! - the public [`Workflow`] and [`WorkflowHandle`] types
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::errors::TaskError;
use crate::exec::TaskOutput;

/// Canonical task identifier type used throughout the engine.
pub type TaskId = String;

/// Outcome of one task attempt, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(TaskOutput),
    Failed(TaskError),
}

impl From<Result<TaskOutput, TaskError>> for TaskOutcome {
    fn from(result: Result<TaskOutput, TaskError>) -> Self {
        match result {
            Ok(output) => TaskOutcome::Success(output),
            Err(error) => TaskOutcome::Failed(error),
        }
    }
}

/// External requests addressed to a running workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Cancel,
}

/// Runtime options used by the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Capacity of the runtime's inbound event channel.
    pub event_buffer: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { event_buffer: 64 }
    }
}

/// Events flowing into the runtime from executors, timers and handles.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched attempt finished.
    TaskCompleted {
        task: TaskId,
        attempt: u32,
        outcome: TaskOutcome,
    },
    /// The backoff delay of a requeued task elapsed.
    RetryDue { task: TaskId },
    Control(ControlCommand),
}

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod workflow;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
pub use workflow::{Workflow, WorkflowHandle, WorkflowReport};
