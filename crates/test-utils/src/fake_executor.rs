use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use flowdag::dag::ScheduledTask;
use flowdag::engine::{RuntimeEvent, TaskOutcome};
use flowdag::errors::Result;
use flowdag::exec::{ExecutorBackend, TaskOutput};
use flowdag::TaskError;

/// One dispatch seen by [`FakeExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task: String,
    pub attempt: u32,
    pub compensates: Option<String>,
}

/// A fake executor that:
/// - records which attempts were dispatched
/// - immediately reports `TaskCompleted` for each, failing the tasks listed
///   in `failing` and succeeding everything else.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<Dispatch>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<Dispatch>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, tasks: &[&str]) -> Self {
        self.failing = tasks.iter().map(|t| t.to_string()).collect();
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(Dispatch {
                        task: t.task_id.clone(),
                        attempt: t.attempt,
                        compensates: t.compensates.clone(),
                    });
                }

                let outcome = if failing.contains(&t.task_id) {
                    TaskOutcome::Failed(TaskError::failed("scripted failure"))
                } else {
                    TaskOutcome::Success(TaskOutput::new())
                };

                // Report from a separate task: the runtime is busy awaiting
                // this very dispatch and its channel is bounded.
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: t.task_id,
                            attempt: t.attempt,
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }

    // Attempts report as soon as they are dispatched; nothing to stop.
    fn cancel_running(&mut self) {}
}
