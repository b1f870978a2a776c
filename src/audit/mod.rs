// src/audit/mod.rs

//! Append-only audit log of every workflow and task transition.
//!
//! The log is written only by the component that owns the workflow state
//! (the validation path while `DRAFT`, then the scheduler loop). Readers get
//! an [`AuditTrail`] handle (pull), and [`EventSink`]s are pushed each event
//! as it is appended.

pub mod log;
pub mod sink;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::TaskId;

pub use log::{AuditLog, AuditTrail};
pub use sink::{EventSink, TracingSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    WorkflowCreated,
    WorkflowValidating,
    WorkflowReady,
    WorkflowStarted,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCancelRequested,
    WorkflowRetrying,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    TaskWaiting,
    TaskReady,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetrying,
    TaskSkipped,
    TaskCancelled,
    ErrorStrategyApplied,
    CompensationStarted,
    CompensationCompleted,
    CompensationFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::WorkflowCreated => "WORKFLOW_CREATED",
            EventType::WorkflowValidating => "WORKFLOW_VALIDATING",
            EventType::WorkflowReady => "WORKFLOW_READY",
            EventType::WorkflowStarted => "WORKFLOW_STARTED",
            EventType::WorkflowPaused => "WORKFLOW_PAUSED",
            EventType::WorkflowResumed => "WORKFLOW_RESUMED",
            EventType::WorkflowCancelRequested => "WORKFLOW_CANCEL_REQUESTED",
            EventType::WorkflowRetrying => "WORKFLOW_RETRYING",
            EventType::WorkflowCompleted => "WORKFLOW_COMPLETED",
            EventType::WorkflowFailed => "WORKFLOW_FAILED",
            EventType::WorkflowCancelled => "WORKFLOW_CANCELLED",
            EventType::TaskWaiting => "TASK_WAITING",
            EventType::TaskReady => "TASK_READY",
            EventType::TaskStarted => "TASK_STARTED",
            EventType::TaskCompleted => "TASK_COMPLETED",
            EventType::TaskFailed => "TASK_FAILED",
            EventType::TaskRetrying => "TASK_RETRYING",
            EventType::TaskSkipped => "TASK_SKIPPED",
            EventType::TaskCancelled => "TASK_CANCELLED",
            EventType::ErrorStrategyApplied => "ERROR_STRATEGY_APPLIED",
            EventType::CompensationStarted => "COMPENSATION_STARTED",
            EventType::CompensationCompleted => "COMPENSATION_COMPLETED",
            EventType::CompensationFailed => "COMPENSATION_FAILED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    event_id: u64,
    timestamp: DateTime<Utc>,
    workflow_id: String,
    task_id: Option<TaskId>,
    event_type: EventType,
    description: String,
}

impl AuditEvent {
    /// Monotonically increasing sequence number, starting at 1.
    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}",
            self.event_id,
            self.timestamp.to_rfc3339(),
            self.event_type
        )?;
        if let Some(task) = &self.task_id {
            write!(f, " [{task}]")?;
        }
        write!(f, " {}", self.description)
    }
}
