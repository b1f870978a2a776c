// src/exec/mod.rs

//! Task execution layer.
//!
//! This module runs task attempts against a user-supplied [`TaskHandler`]
//! and reports back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`handler`] defines the handler contract and the cancellation signal.
//! - [`executor_loop`] owns the main executor loop which manages attempts.
//! - [`task_runner`] runs one attempt, enforcing its timeout.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `HandlerExecutor` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod handler;
pub mod task_runner;

pub use backend::{ExecutorBackend, HandlerExecutor};
pub use executor_loop::spawn_executor;
pub use handler::{
    CancelSignal, FnHandler, HandlerFuture, TaskHandler, TaskInvocation, TaskOutput, handler_fn,
};
