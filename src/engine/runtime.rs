// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, WorkflowSnapshot};
use crate::errors::{FlowdagError, Result};
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent, TaskId};

/// Async loop of one workflow run.
///
/// Every decision is made by [`CoreRuntime`]; this shell only moves events
/// in from the channel, hands admitted attempts to the [`ExecutorBackend`],
/// sleeps out backoff delays and publishes a snapshot after each step.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by backoff timers to feed `RetryDue` back into the loop.
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    status_tx: watch::Sender<WorkflowSnapshot>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        executor: E,
        status_tx: watch::Sender<WorkflowSnapshot>,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            status_tx,
        }
    }

    /// Run until the core reports a terminal workflow state and return the
    /// final snapshot.
    pub async fn run(mut self) -> Result<WorkflowSnapshot> {
        let workflow = self.core.scheduler().workflow_id().to_string();
        info!(workflow = %workflow, "flowdag runtime started");

        let step = self.core.start();
        let mut keep_running = self.apply(step).await?;

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                warn!(workflow = %workflow, "runtime event channel closed before the workflow finished");
                return Err(FlowdagError::ChannelClosed(
                    "runtime event channel".to_string(),
                ));
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            keep_running = self.apply(step).await?;
        }

        let snapshot = self.core.snapshot();
        info!(
            workflow = %workflow,
            status = %snapshot.status,
            retries = snapshot.retries_attempted,
            "runtime exiting"
        );
        Ok(snapshot)
    }

    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        self.status_tx.send_replace(self.core.snapshot());
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::ScheduleRetry { task, delay } => {
                self.schedule_retry(task, delay);
            }
            CoreCommand::CancelRunning => {
                self.executor.cancel_running();
            }
            CoreCommand::Finished(status) => {
                info!(status = %status, "core reported a terminal workflow state");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    fn schedule_retry(&self, task: TaskId, delay: Duration) {
        debug!(task = %task, ?delay, "arming backoff timer");
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The runtime may have finished in the meantime.
            let _ = tx.send(RuntimeEvent::RetryDue { task }).await;
        });
    }
}
