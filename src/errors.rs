// src/errors.rs

//! Crate-wide error types.
//!
//! - [`ValidationError`]: a definition that can never run (bad graph, bad
//!   field). Raised while the workflow is `VALIDATING`.
//! - [`TaskError`]: what a task handler reports back. Routed through the
//!   retry and error policy, never swallowed.
//! - [`FlowdagError`]: everything the public API can return.
//!
//! Broken scheduler invariants (e.g. admitting a task twice) are not errors:
//! they panic.

use std::time::Duration;

use thiserror::Error;

use crate::engine::TaskId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate task id '{0}'")]
    DuplicateTask(TaskId),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("dependency map references unknown task '{0}'")]
    UnknownTask(TaskId),

    #[error("cycle detected in task graph: {}", .0.join(" -> "))]
    Cycle(Vec<TaskId>),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("task '{task}' has invalid condition '{condition}': {reason}")]
    InvalidCondition {
        task: TaskId,
        condition: String,
        reason: String,
    },

    #[error("workflow must contain at least one task")]
    NoTasks,
}

/// Failure reported for a single task attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("TIMEOUT: task exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("task observed cancellation")]
    Cancelled,
}

impl TaskError {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskError::Failed(reason.into())
    }

    /// Short machine-readable reason used in audit descriptions.
    pub fn reason_code(&self) -> &'static str {
        match self {
            TaskError::Failed(_) => "ERROR",
            TaskError::Timeout(_) => "TIMEOUT",
            TaskError::Cancelled => "CANCELLED",
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Failed(format!("{err:#}"))
    }
}

#[derive(Error, Debug)]
pub enum FlowdagError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("Runtime channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FlowdagError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FlowdagError::ChannelClosed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FlowdagError {
    fn from(err: tokio::task::JoinError) -> Self {
        FlowdagError::Other(anyhow::Error::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FlowdagError>;
