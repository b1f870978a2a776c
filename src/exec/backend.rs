// src/exec/backend.rs

//! Seam between the runtime loop and whatever runs task attempts.
//!
//! [`HandlerExecutor`] feeds attempts to the executor loop, which calls the
//! workflow's [`TaskHandler`]. Test suites plug in a backend that answers
//! dispatches directly with `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{FlowdagError, Result};
use crate::exec::executor_loop::spawn_executor;
use crate::exec::handler::{CancelSignal, TaskHandler};

/// Trait abstracting how scheduled tasks are executed.
///
/// Every dispatched attempt must eventually be answered with exactly one
/// `RuntimeEvent::TaskCompleted` carrying the same task id and attempt.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every running attempt to stop. Attempts still report back.
    fn cancel_running(&mut self);
}

/// Real executor backend running attempts against a [`TaskHandler`].
pub struct HandlerExecutor {
    tx: mpsc::Sender<ScheduledTask>,
    cancel_tx: watch::Sender<bool>,
}

impl HandlerExecutor {
    /// Create a new executor backend, wiring it to the given runtime event
    /// sender.
    ///
    /// This spawns the background executor loop immediately, so it must be
    /// called from within a Tokio runtime.
    pub fn new(handler: Arc<dyn TaskHandler>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let tx = spawn_executor(handler, CancelSignal::new(cancel_rx), runtime_tx);
        Self { tx, cancel_tx }
    }
}

impl ExecutorBackend for HandlerExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(task).await.map_err(FlowdagError::from)?;
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) {
        info!("broadcasting cancellation to running attempts");
        self.cancel_tx.send_replace(true);
    }
}
