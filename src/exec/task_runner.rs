// src/exec/task_runner.rs

//! Runs a single attempt of a task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::TaskError;
use crate::exec::handler::{CancelSignal, TaskHandler, TaskInvocation, TaskOutput};

/// Run one attempt and report exactly one `TaskCompleted` event for it.
///
/// The handler runs in its own Tokio task so that a panic is reported as a
/// failed attempt instead of leaving the scheduler waiting. When the
/// attempt's timeout elapses first, the handler task is aborted and the
/// attempt fails with [`TaskError::Timeout`].
pub async fn run_task(
    handler: Arc<dyn TaskHandler>,
    task: ScheduledTask,
    cancel: CancelSignal,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let task_id = task.task_id.clone();
    let attempt = task.attempt;
    info!(
        task = %task_id,
        attempt,
        task_type = %task.task_type,
        "starting task attempt"
    );

    let result = execute(handler, task, cancel).await;

    match &result {
        Ok(_) => info!(task = %task_id, attempt, "task attempt succeeded"),
        Err(err) => warn!(
            task = %task_id,
            attempt,
            reason = err.reason_code(),
            error = %err,
            "task attempt failed"
        ),
    }

    let event = RuntimeEvent::TaskCompleted {
        task: task_id.clone(),
        attempt,
        outcome: TaskOutcome::from(result),
    };
    if runtime_tx.send(event).await.is_err() {
        error!(task = %task_id, attempt, "runtime is gone; dropping task result");
    }
}

async fn execute(
    handler: Arc<dyn TaskHandler>,
    task: ScheduledTask,
    cancel: CancelSignal,
) -> Result<TaskOutput, TaskError> {
    let timeout = task.timeout;
    let invocation = TaskInvocation {
        task_id: task.task_id,
        task_type: task.task_type,
        attempt: task.attempt,
        input: task.input,
        context: task.context,
        compensates: task.compensates,
        cancel,
    };

    let mut join = tokio::spawn(async move { handler.execute(invocation).await });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut join).await {
            Ok(joined) => joined,
            Err(_) => {
                join.abort();
                return Err(TaskError::Timeout(limit));
            }
        },
        None => join.await,
    };

    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(TaskError::failed("handler panicked")),
        Err(err) => Err(TaskError::failed(format!("handler task aborted: {err}"))),
    }
}
