// src/lib.rs

//! flowdag: a workflow orchestration engine.
//!
//! A workflow is a DAG of tasks with per-task retry, run conditions and
//! compensations. The engine validates the definition, admits ready tasks
//! according to the execution mode, applies the workflow's error strategy to
//! failures, and records every transition in an append-only audit log.
//!
//! ```no_run
//! use flowdag::{TaskError, TaskOutput, Workflow, handler_fn};
//!
//! # async fn demo() -> flowdag::errors::Result<()> {
//! let workflow = Workflow::from_toml_str(
//!     r#"
//! id = "etl"
//!
//! [[task]]
//! id = "extract"
//! type = "sql"
//!
//! [[task]]
//! id = "load"
//! type = "sql"
//! dependencies = ["extract"]
//! "#,
//! )?;
//!
//! let handle = workflow.start(handler_fn(|inv| async move {
//!     Ok::<_, TaskError>(TaskOutput::new().with_output("task", inv.task_id.clone()))
//! }))?;
//! let report = handle.wait().await?;
//! println!("{}", report.status());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod policy;
pub mod types;

pub use audit::{AuditEvent, AuditTrail, EventSink, EventType, TracingSink};
pub use config::{RawWorkflowDefinition, TaskSpec, WorkflowDefinition};
pub use context::{Condition, ContextSnapshot, Value};
pub use dag::{TaskSnapshot, TaskStatus, WorkflowSnapshot, WorkflowStatus};
pub use engine::{RuntimeOptions, TaskId, Workflow, WorkflowHandle, WorkflowReport};
pub use errors::{FlowdagError, TaskError, ValidationError};
pub use exec::{CancelSignal, TaskHandler, TaskInvocation, TaskOutput, handler_fn};
pub use types::{BackoffKind, ErrorStrategy, ExecutionMode, Priority, RetryBackoff};
