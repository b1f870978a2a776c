// src/engine/workflow.rs

//! Public entry points: build a [`Workflow`], validate it, start it, and
//! control it through the returned [`WorkflowHandle`].

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditLog, AuditTrail, EventSink, EventType};
use crate::config::{RawWorkflowDefinition, WorkflowDefinition, from_toml_str, load_from_path};
use crate::dag::{Scheduler, TaskStatus, WorkflowSnapshot, WorkflowStatus};
use crate::engine::{ControlCommand, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::{FlowdagError, Result};
use crate::exec::{ExecutorBackend, HandlerExecutor, TaskHandler};

/// A workflow before it runs.
///
/// Created in `DRAFT`, where the definition may still be edited. Validation
/// moves it to `READY` (or `FAILED`), after which [`Workflow::start`] hands
/// it to a runtime.
#[derive(Debug)]
pub struct Workflow {
    raw: RawWorkflowDefinition,
    definition: Option<Arc<WorkflowDefinition>>,
    status: WorkflowStatus,
    audit: AuditLog,
    options: RuntimeOptions,
}

impl Workflow {
    pub fn new(raw: RawWorkflowDefinition) -> Self {
        let mut audit = AuditLog::new(raw.id.clone());
        audit.record(
            EventType::WorkflowCreated,
            format!("{} task(s) defined", raw.tasks.len()),
            None,
        );
        Self {
            raw,
            definition: None,
            status: WorkflowStatus::Draft,
            audit,
            options: RuntimeOptions::default(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(Self::new(from_toml_str(contents)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_from_path(path)?))
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> &str {
        &self.raw.id
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn definition(&self) -> &RawWorkflowDefinition {
        &self.raw
    }

    /// Edit the definition. Only allowed while `DRAFT`.
    pub fn definition_mut(&mut self) -> Result<&mut RawWorkflowDefinition> {
        if self.status != WorkflowStatus::Draft {
            return Err(FlowdagError::InvalidState(format!(
                "definition of workflow '{}' is frozen once {}",
                self.raw.id, self.status
            )));
        }
        Ok(&mut self.raw)
    }

    /// Register a sink that is pushed every event recorded from now on.
    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.audit.add_sink(sink);
    }

    pub fn audit_trail(&self) -> AuditTrail {
        self.audit.trail()
    }

    /// `DRAFT -> VALIDATING -> READY | FAILED`.
    ///
    /// A workflow that is already `READY` validates trivially. A failed
    /// validation is final: the workflow stays `FAILED`.
    pub fn validate(&mut self) -> Result<()> {
        match self.status {
            WorkflowStatus::Ready => return Ok(()),
            WorkflowStatus::Draft => {}
            other => {
                return Err(FlowdagError::InvalidState(format!(
                    "cannot validate workflow '{}' in state {other}",
                    self.raw.id
                )));
            }
        }

        self.audit.set_workflow_id(self.raw.id.clone());
        self.set_status(
            WorkflowStatus::Validating,
            EventType::WorkflowValidating,
            "validating definition",
        );

        match WorkflowDefinition::try_from(self.raw.clone()) {
            Ok(definition) => {
                let description = format!(
                    "{} task(s), {} dependency edge(s)",
                    definition.graph().len(),
                    definition.graph().edge_count()
                );
                self.definition = Some(Arc::new(definition));
                self.set_status(WorkflowStatus::Ready, EventType::WorkflowReady, description);
                Ok(())
            }
            Err(err) => {
                info!(workflow = %self.raw.id, error = %err, "workflow validation failed");
                self.set_status(
                    WorkflowStatus::Failed,
                    EventType::WorkflowFailed,
                    format!("validation failed: {err}"),
                );
                Err(err.into())
            }
        }
    }

    /// Validate if needed and start running every attempt through `handler`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H: TaskHandler>(self, handler: H) -> Result<WorkflowHandle> {
        let handler: Arc<dyn TaskHandler> = Arc::new(handler);
        self.start_with_backend(move |runtime_tx| HandlerExecutor::new(handler, runtime_tx))
    }

    /// Like [`Workflow::start`], with a custom executor backend.
    pub fn start_with_backend<E, F>(mut self, make_backend: F) -> Result<WorkflowHandle>
    where
        E: ExecutorBackend + 'static,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let rt = Handle::try_current().map_err(|err| {
            FlowdagError::InvalidState(format!("starting a workflow requires a Tokio runtime: {err}"))
        })?;

        if self.status == WorkflowStatus::Draft {
            self.validate()?;
        }
        let definition = match (&self.definition, self.status) {
            (Some(definition), WorkflowStatus::Ready) => Arc::clone(definition),
            _ => {
                return Err(FlowdagError::InvalidState(format!(
                    "cannot start workflow '{}' in state {}",
                    self.raw.id, self.status
                )));
            }
        };

        let workflow_id = self.raw.id.clone();
        let trail = self.audit.trail();
        let core = CoreRuntime::new(Scheduler::new(definition, self.audit));

        let (event_tx, event_rx) = mpsc::channel(self.options.event_buffer.max(1));
        let executor = make_backend(event_tx.clone());
        let (status_tx, status_rx) = watch::channel(core.snapshot());

        let runtime = Runtime::new(core, event_rx, event_tx.clone(), executor, status_tx);
        let join = rt.spawn(runtime.run());

        Ok(WorkflowHandle {
            workflow_id,
            events_tx: event_tx,
            status_rx,
            trail,
            join,
        })
    }

    fn set_status(&mut self, next: WorkflowStatus, event: EventType, description: impl Into<String>) {
        debug_assert!(self.status.can_transition_to(next), "{} -> {next}", self.status);
        debug!(workflow = %self.raw.id, from = %self.status, to = %next, "workflow transition");
        self.status = next;
        self.audit.record(event, description, None);
    }
}

/// Control surface of a started workflow.
///
/// `pause`, `resume` and `cancel` are requests: they are applied in order by
/// the runtime loop, and are no-ops when they do not apply to the current
/// state (pausing a paused workflow, anything on a terminal one).
#[derive(Debug)]
pub struct WorkflowHandle {
    workflow_id: String,
    events_tx: mpsc::Sender<RuntimeEvent>,
    status_rx: watch::Receiver<WorkflowSnapshot>,
    trail: AuditTrail,
    join: JoinHandle<Result<WorkflowSnapshot>>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub async fn pause(&self) {
        self.control(ControlCommand::Pause).await;
    }

    pub async fn resume(&self) {
        self.control(ControlCommand::Resume).await;
    }

    pub async fn cancel(&self) {
        self.control(ControlCommand::Cancel).await;
    }

    async fn control(&self, command: ControlCommand) {
        if self.status_rx.borrow().status.is_terminal() {
            debug!(workflow = %self.workflow_id, ?command, "workflow already finished; ignoring");
            return;
        }
        if self
            .events_tx
            .send(RuntimeEvent::Control(command))
            .await
            .is_err()
        {
            debug!(workflow = %self.workflow_id, ?command, "runtime already stopped; ignoring");
        }
    }

    /// Latest published snapshot (`getStatus`).
    pub fn status(&self) -> WorkflowSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Every audit event recorded so far, in order (`getAuditTrail`).
    pub fn audit_trail(&self) -> Vec<AuditEvent> {
        self.trail.events()
    }

    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// Wait until a published snapshot satisfies `predicate`. Returns the
    /// final snapshot instead if the runtime stops first.
    pub async fn wait_until<F>(&self, predicate: F) -> WorkflowSnapshot
    where
        F: FnMut(&WorkflowSnapshot) -> bool,
    {
        let mut rx = self.status_rx.clone();
        let found = rx.wait_for(predicate).await.map(|snapshot| snapshot.clone());
        found.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Wait for the run to end: a terminal state with no attempt still running.
    pub async fn wait(self) -> Result<WorkflowReport> {
        let snapshot = self.join.await??;
        Ok(WorkflowReport {
            snapshot,
            events: self.trail.events(),
        })
    }
}

/// Final state of a finished workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub snapshot: WorkflowSnapshot,
    pub events: Vec<AuditEvent>,
}

impl WorkflowReport {
    pub fn status(&self) -> WorkflowStatus {
        self.snapshot.status
    }

    pub fn task_status(&self, task: &str) -> Option<TaskStatus> {
        self.snapshot.tasks.get(task).map(|t| t.status)
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Task ids of events of one type, in log order.
    pub fn tasks_with(&self, event_type: EventType) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .filter_map(|e| e.task_id())
            .collect()
    }
}
