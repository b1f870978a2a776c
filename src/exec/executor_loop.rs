// src/exec/executor_loop.rs

//! Main executor loop that owns running task attempts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskId};
use crate::exec::handler::{CancelSignal, TaskHandler};
use crate::exec::task_runner::run_task;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledTask>` is what
/// [`HandlerExecutor`](crate::exec::HandlerExecutor) forwards dispatches to.
/// Each attempt runs in its own Tokio task. Per task id there is never more
/// than one attempt in flight; the scheduler guarantees this and the loop
/// logs loudly if it is ever violated.
///
/// When the sender side is dropped the loop stops and aborts whatever is
/// still running.
pub fn spawn_executor(
    handler: Arc<dyn TaskHandler>,
    cancel: CancelSignal,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<TaskId, JoinHandle<()>> = HashMap::new();

        while let Some(task) = rx.recv().await {
            active.retain(|_, handle| !handle.is_finished());

            if active.contains_key(&task.task_id) {
                error!(
                    task = %task.task_id,
                    attempt = task.attempt,
                    "attempt dispatched while a previous one is still in flight"
                );
            }

            debug!(task = %task.task_id, attempt = task.attempt, "spawning attempt");
            let id = task.task_id.clone();
            let handle = tokio::spawn(run_task(
                Arc::clone(&handler),
                task,
                cancel.clone(),
                runtime_tx.clone(),
            ));
            active.insert(id, handle);
        }

        for (task, handle) in active.drain() {
            if !handle.is_finished() {
                debug!(task = %task, "aborting attempt at executor shutdown");
                handle.abort();
            }
        }
        info!("executor loop finished (channel closed)");
    });

    tx
}
