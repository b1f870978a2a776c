// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the validated, immutable task graph.
//! - [`status`] defines the workflow and task state machines.
//! - [`scheduler`] contains the per-workflow state machine that decides
//!   which tasks are ready, admits them, and applies failure policy.
//! - [`task_info`] provides task metadata and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod status;
pub mod task_info;

pub use graph::TaskGraph;
pub use scheduler::{Scheduler, WorkflowSnapshot};
pub use scheduler_step::{RetryRequest, SchedulerStep};
pub use status::{TaskStatus, WorkflowStatus};
pub use task_info::{ScheduledTask, TaskSnapshot};
