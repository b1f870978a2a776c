// src/exec/handler.rs

//! The contract between the engine and the code that actually does a task's
//! work.
//!
//! The engine never interprets `task_type`; a [`TaskHandler`] receives every
//! attempt and decides what to do with it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::context::{ContextSnapshot, Value};
use crate::engine::TaskId;
use crate::errors::TaskError;

/// Everything a handler gets to see for one attempt.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub task_id: TaskId,
    pub task_type: String,
    pub attempt: u32,
    pub input: Arc<BTreeMap<String, Value>>,
    /// Run context as of dispatch. Writes go through
    /// [`TaskOutput::context_updates`].
    pub context: ContextSnapshot,
    /// Set when this invocation compensates the named task.
    pub compensates: Option<TaskId>,
    pub cancel: CancelSignal,
}

impl TaskInvocation {
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.input.get(key)
    }
}

/// Successful result of an attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub outputs: BTreeMap<String, Value>,
    /// Committed to the run context atomically when the task completes.
    pub context_updates: BTreeMap<String, Value>,
}

impl TaskOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.into(), value.into());
        self
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<TaskOutput, TaskError>> + Send + 'a>>;

/// Executes task attempts.
///
/// Handlers should observe [`TaskInvocation::cancel`] and return
/// [`TaskError::Cancelled`] promptly. Cancellation is cooperative: a handler
/// that ignores the signal runs to completion. A timeout is not: the attempt's
/// Tokio task is aborted, so the handler future is dropped at its next
/// `.await` and the attempt fails with [`TaskError::Timeout`].
pub trait TaskHandler: Send + Sync + 'static {
    fn execute(&self, invocation: TaskInvocation) -> HandlerFuture<'_>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F>(F);

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    fn execute(&self, invocation: TaskInvocation) -> HandlerFuture<'_> {
        Box::pin((self.0)(invocation))
    }
}

/// Wrap an async closure as a handler.
///
/// ```no_run
/// use flowdag::TaskError;
/// use flowdag::exec::{TaskOutput, handler_fn};
///
/// let handler = handler_fn(|inv| async move {
///     Ok::<_, TaskError>(TaskOutput::new().with_output("ran", inv.task_id.clone()))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    FnHandler(f)
}

impl<H: TaskHandler + ?Sized> TaskHandler for Arc<H> {
    fn execute(&self, invocation: TaskInvocation) -> HandlerFuture<'_> {
        (**self).execute(invocation)
    }
}

/// Cooperative cancellation signal shared by every attempt of a workflow.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation was requested. Never resolves if the
    /// sending side goes away without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
