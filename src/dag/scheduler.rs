// src/dag/scheduler.rs

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditTrail, EventType};
use crate::config::WorkflowDefinition;
use crate::context::{RunContext, Value};
use crate::dag::scheduler_step::{RetryRequest, SchedulerStep};
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::status::{TaskStatus, WorkflowStatus};
use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskSnapshot};
use crate::engine::{TaskId, TaskOutcome};
use crate::errors::TaskError;
use crate::exec::TaskOutput;
use crate::policy::{FailureDecision, FailureFacts, StrategyAction, decide};
use crate::types::{DYNAMIC_MODE_VARIABLE, ExecutionMode};

/// Point-in-time view of a workflow, as returned by `getStatus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Share of schedulable tasks in a terminal state, 0.0 to 100.0.
    pub progress_percentage: f64,
    /// Whole-run restarts consumed so far.
    pub retries_attempted: u32,
    pub tasks: BTreeMap<TaskId, TaskSnapshot>,
    pub context: BTreeMap<String, Value>,
}

/// Bookkeeping for a single run; dropped wholesale on a workflow retry.
#[derive(Debug, Default)]
struct RunFlags {
    /// Failure handling stopped admission (`fail_fast`, `rollback`, `compensate`).
    failure_decided: bool,
    /// The run will end `FAILED`.
    failed: bool,
    cancel_requested: bool,
    /// `Some(compensable_only)` once a rollback was decided.
    rollback: Option<bool>,
    /// `(compensation task, compensated task)`, built once running work drained.
    compensation_queue: Option<VecDeque<(usize, usize)>>,
    /// Task currently being compensated.
    compensating: Option<usize>,
    completion_order: Vec<usize>,
}

impl RunFlags {
    fn halting(&self) -> bool {
        self.failure_decided || self.cancel_requested
    }
}

/// Scheduler holds the validated definition plus all mutable workflow state.
///
/// It is a pure state machine: every input (start, a task finishing, a
/// backoff timer firing, a control command) is one method call that returns a
/// [`SchedulerStep`] describing what the shell has to do next. Nothing here
/// sleeps or spawns, so it can be stepped by hand in tests.
///
/// It is responsible for:
/// - deciding which tasks are ready (dependencies, conditions)
/// - admitting ready tasks according to the execution mode
/// - applying retry and error-strategy policy to failures
/// - running compensations during a rollback
/// - finishing (or restarting) the run
#[derive(Debug)]
pub struct Scheduler {
    definition: Arc<WorkflowDefinition>,
    tasks: Vec<TaskInfo>,
    context: RunContext,
    audit: AuditLog,
    status: WorkflowStatus,
    run: RunFlags,
    retries_attempted: u32,
}

impl Scheduler {
    /// Construct a scheduler for a validated definition. `audit` is the
    /// workflow's log; the workflow is expected to be `READY`.
    pub fn new(definition: Arc<WorkflowDefinition>, audit: AuditLog) -> Self {
        let graph = definition.graph();
        let tasks = graph
            .tasks()
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                TaskInfo::from_spec(i, spec, definition.compiled(i), graph.depth_of(&spec.id))
            })
            .collect();
        let context = RunContext::new(definition.variables().clone());

        Self {
            definition,
            tasks,
            context,
            audit,
            status: WorkflowStatus::Ready,
            run: RunFlags::default(),
            retries_attempted: 0,
        }
    }

    pub fn workflow_id(&self) -> &str {
        self.definition.id()
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Terminal and drained. A `fail_fast` run turns `FAILED` while tasks
    /// may still be running; it is finished once they have reported.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() && ReadOnlyStateManager::new(&self.tasks).running_count() == 0
    }

    pub fn task_status(&self, task: &str) -> Option<TaskStatus> {
        let i = self.definition.graph().index_of(task)?;
        Some(self.tasks[i].status)
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn audit_trail(&self) -> AuditTrail {
        self.audit.trail()
    }

    pub fn retries_attempted(&self) -> u32 {
        self.retries_attempted
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.definition.id().to_string(),
            status: self.status,
            progress_percentage: ReadOnlyStateManager::new(&self.tasks).progress_percentage(),
            retries_attempted: self.retries_attempted,
            tasks: self
                .tasks
                .iter()
                .map(|t| (t.id.clone(), t.snapshot()))
                .collect(),
            context: self.context.values().clone(),
        }
    }

    /// Mode used for the next admission. `dynamic` is resolved from the run
    /// context on every call.
    pub fn effective_mode(&self) -> ExecutionMode {
        match self.definition.execution_mode() {
            ExecutionMode::Dynamic => self
                .context
                .get(DYNAMIC_MODE_VARIABLE)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<ExecutionMode>().ok())
                .filter(|mode| *mode != ExecutionMode::Dynamic)
                .unwrap_or(ExecutionMode::Parallel),
            mode => mode,
        }
    }

    /// `READY -> RUNNING` and admit the first tasks.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.status != WorkflowStatus::Ready {
            warn!(workflow = %self.workflow_id(), status = %self.status, "start ignored");
            return step;
        }

        let description = format!(
            "{} tasks, {} mode, error strategy {}",
            self.tasks.iter().filter(|t| !t.compensation_only).count(),
            self.definition.execution_mode(),
            self.definition.error_strategy()
        );
        self.set_status(WorkflowStatus::Running, EventType::WorkflowStarted, description);
        self.settle(&mut step);
        step
    }

    /// Handle the result of one attempt (or compensation) of `task`.
    ///
    /// # Panics
    ///
    /// If `task` is unknown or is not running `attempt`: the runtime only
    /// reports attempts the scheduler dispatched, exactly once each.
    pub fn handle_completion(
        &mut self,
        task: &str,
        attempt: u32,
        outcome: TaskOutcome,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(i) = self.definition.graph().index_of(task) else {
            panic!("scheduler invariant violated: completion for unknown task '{task}'");
        };
        let info = &self.tasks[i];
        if info.status != TaskStatus::Running || info.attempts != attempt {
            panic!(
                "scheduler invariant violated: completion of attempt {attempt} for task '{task}' \
                 which is {} at attempt {}",
                info.status, info.attempts
            );
        }

        if info.compensation_only {
            self.complete_compensation(i, outcome);
        } else {
            match outcome {
                TaskOutcome::Success(output) => self.complete_success(i, output),
                TaskOutcome::Failed(error) => self.complete_failure(i, error, &mut step),
            }
        }

        self.settle(&mut step);
        step
    }

    /// A backoff timer for `task` fired.
    pub fn retry_due(&mut self, task: &str) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        match self.definition.graph().index_of(task) {
            Some(i) if self.tasks[i].held_for_backoff => {
                debug!(task = %task, "backoff elapsed");
                self.tasks[i].held_for_backoff = false;
                self.settle(&mut step);
            }
            _ => debug!(task = %task, "stale retry timer ignored"),
        }
        step
    }

    /// Stop admitting new tasks. Running tasks continue. No-op unless `RUNNING`.
    pub fn pause(&mut self) -> SchedulerStep {
        if self.status != WorkflowStatus::Running {
            debug!(workflow = %self.workflow_id(), status = %self.status, "pause ignored");
            return SchedulerStep::default();
        }
        let running = ReadOnlyStateManager::new(&self.tasks).running_count();
        self.set_status(
            WorkflowStatus::Paused,
            EventType::WorkflowPaused,
            format!("admission stopped; {running} task(s) still running"),
        );
        SchedulerStep::default()
    }

    /// Resume admission. No-op unless `PAUSED`.
    pub fn resume(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.status != WorkflowStatus::Paused {
            debug!(workflow = %self.workflow_id(), status = %self.status, "resume ignored");
            return step;
        }
        self.set_status(WorkflowStatus::Running, EventType::WorkflowResumed, "admission resumed");
        self.settle(&mut step);
        step
    }

    /// Cancel the workflow: unstarted tasks are cancelled at once, running
    /// handlers are asked to stop, and the workflow becomes `CANCELLED` when
    /// they have drained. No-op once terminal or already cancelling.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.status.is_terminal() || self.run.cancel_requested {
            debug!(workflow = %self.workflow_id(), status = %self.status, "cancel ignored");
            return step;
        }

        self.run.cancel_requested = true;
        self.audit.record(
            EventType::WorkflowCancelRequested,
            format!("cancel requested while {}", self.status),
            None,
        );
        StateManager::new(&mut self.tasks, &mut self.audit).cancel_open("workflow cancelled");

        step.cancel_running = ReadOnlyStateManager::new(&self.tasks).running_count() > 0;
        self.settle(&mut step);
        step
    }

    fn complete_success(&mut self, i: usize, output: TaskOutput) {
        let changed = self.context.commit(output.context_updates);
        let info = &mut self.tasks[i];
        info.outputs = output.outputs;
        info.last_error = None;

        let attempt = info.attempts;
        info!(task = %info.id, attempt, "task completed");
        let description = if changed.is_empty() {
            format!("attempt {attempt} succeeded")
        } else {
            format!(
                "attempt {attempt} succeeded; context updated: {}",
                changed.join(", ")
            )
        };
        StateManager::new(&mut self.tasks, &mut self.audit).transition(
            i,
            TaskStatus::Completed,
            EventType::TaskCompleted,
            description,
        );
        self.run.completion_order.push(i);
    }

    fn complete_failure(&mut self, i: usize, error: TaskError, step: &mut SchedulerStep) {
        if matches!(error, TaskError::Cancelled) && self.run.cancel_requested {
            self.tasks[i].last_error = Some(error);
            StateManager::new(&mut self.tasks, &mut self.audit).transition(
                i,
                TaskStatus::Cancelled,
                EventType::TaskCancelled,
                "stopped after workflow cancellation",
            );
            return;
        }

        let info = &self.tasks[i];
        let decision = decide(FailureFacts {
            error: &error,
            retry_count: info.retry_count,
            max_retries: info.max_retries,
            allow_failure: info.allow_failure,
            halting: self.run.halting(),
            continue_on_error: self.definition.continue_on_error(),
            strategy: self.definition.error_strategy(),
        });

        let id = info.id.clone();
        let attempt = info.attempts;
        let max_retries = info.max_retries;
        warn!(task = %id, attempt, error = %error, ?decision, "task attempt failed");

        let suffix = match decision {
            FailureDecision::Retry { .. } => "; will retry",
            FailureDecision::Tolerate => "; failure tolerated",
            FailureDecision::Record | FailureDecision::Apply(_) => "",
        };
        let description = format!("attempt {attempt} failed ({}): {error}{suffix}", error.reason_code());
        self.tasks[i].last_error = Some(error);
        let mut states = StateManager::new(&mut self.tasks, &mut self.audit);
        states.transition(i, TaskStatus::Failed, EventType::TaskFailed, description);

        match decision {
            FailureDecision::Retry { retry_count } => {
                let delay = self
                    .definition
                    .backoff()
                    .map(|b| b.delay_for(retry_count))
                    .filter(|d| !d.is_zero());
                let description = match delay {
                    Some(d) => format!("retry {retry_count} of {max_retries} after {d:?}"),
                    None => format!("retry {retry_count} of {max_retries}"),
                };
                states.transition(i, TaskStatus::Pending, EventType::TaskRetrying, description);

                let info = &mut self.tasks[i];
                info.retry_count = retry_count;
                if let Some(delay) = delay {
                    info.held_for_backoff = true;
                    step.retries.push(RetryRequest { task_id: id, delay });
                }
            }
            FailureDecision::Tolerate => {
                self.tasks[i].tolerated = true;
            }
            FailureDecision::Record => {
                if !self.definition.continue_on_error() && !self.run.cancel_requested {
                    self.run.failed = true;
                }
                step.newly_failed.push(id);
            }
            FailureDecision::Apply(action) => {
                self.run.failed = true;
                self.apply_strategy(&id, action);
                step.newly_failed.push(id);
            }
        }
    }

    fn apply_strategy(&mut self, task: &str, action: StrategyAction) {
        let strategy = self.definition.error_strategy();
        let description = match action {
            StrategyAction::Halt => {
                format!("{strategy}: task '{task}' failed; no further tasks will start")
            }
            StrategyAction::BlockDependents => {
                format!("{strategy}: task '{task}' failed; its dependents are blocked")
            }
            StrategyAction::Rollback { .. } => {
                format!("{strategy}: task '{task}' failed; compensating completed tasks")
            }
        };
        info!(workflow = %self.workflow_id(), task = %task, %strategy, "applying error strategy");
        self.audit
            .record(EventType::ErrorStrategyApplied, description, Some(task));

        match action {
            StrategyAction::Halt => {
                self.halt(task);
                self.fail_now(task);
            }
            StrategyAction::BlockDependents => {}
            StrategyAction::Rollback { compensable_only } => {
                self.run.rollback = Some(compensable_only);
                self.halt(task);
            }
        }
    }

    fn halt(&mut self, task: &str) {
        self.run.failure_decided = true;
        StateManager::new(&mut self.tasks, &mut self.audit)
            .cancel_open(&format!("workflow halted after task '{task}' failed"));
    }

    /// `fail_fast` reports `FAILED` at once, unless a workflow-level retry is
    /// still available. Attempts still running are recorded as they finish.
    fn fail_now(&mut self, task: &str) {
        if self.retries_attempted < self.definition.max_retries() {
            return;
        }
        let running = ReadOnlyStateManager::new(&self.tasks).running_count();
        info!(workflow = %self.workflow_id(), task = %task, running, "workflow failed");
        self.set_status(
            WorkflowStatus::Failed,
            EventType::WorkflowFailed,
            format!("task '{task}' failed; {running} task(s) still running"),
        );
    }

    fn complete_compensation(&mut self, i: usize, outcome: TaskOutcome) {
        let target = self
            .run
            .compensating
            .take()
            .map(|t| self.tasks[t].id.clone())
            .unwrap_or_default();
        let id = self.tasks[i].id.clone();
        let mut states = StateManager::new(&mut self.tasks, &mut self.audit);
        match outcome {
            TaskOutcome::Success(output) => {
                states.transition(
                    i,
                    TaskStatus::Completed,
                    EventType::CompensationCompleted,
                    format!("compensated '{target}'"),
                );
                self.context.commit(output.context_updates);
                self.tasks[i].outputs = output.outputs;
            }
            TaskOutcome::Failed(error) => {
                warn!(task = %id, compensates = %target, error = %error, "compensation failed");
                states.transition(
                    i,
                    TaskStatus::Failed,
                    EventType::CompensationFailed,
                    format!("compensation of '{target}' failed: {error}"),
                );
                self.tasks[i].last_error = Some(error);
            }
        }
    }

    /// Admit ready tasks according to the effective mode and capacity,
    /// highest priority first, then definition order.
    fn admit(&mut self) -> Vec<ScheduledTask> {
        if self.status != WorkflowStatus::Running || self.run.halting() {
            return Vec::new();
        }

        let mode = self.effective_mode();
        let limit = match mode {
            ExecutionMode::Sequential => 1,
            _ => self.definition.max_parallel_tasks(),
        };
        let view = ReadOnlyStateManager::new(&self.tasks);
        let capacity = limit.saturating_sub(view.running_count());
        if capacity == 0 {
            return Vec::new();
        }
        let stage = match mode {
            ExecutionMode::Hybrid => view.shallowest_unfinished_depth(),
            _ => None,
        };

        let mut ready: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == TaskStatus::Ready)
            .filter(|(_, t)| stage.is_none_or(|depth| t.depth == depth))
            .map(|(i, _)| i)
            .collect();
        ready.sort_by_key(|&i| (Reverse(self.tasks[i].priority), self.tasks[i].index));
        ready.truncate(capacity);

        let mut admitted = Vec::with_capacity(ready.len());
        for i in ready {
            self.tasks[i].attempts += 1;
            let attempt = self.tasks[i].attempts;
            StateManager::new(&mut self.tasks, &mut self.audit).transition(
                i,
                TaskStatus::Running,
                EventType::TaskStarted,
                format!("attempt {attempt} ({mode} mode)"),
            );
            admitted.push(self.dispatch(i, None));
        }
        admitted
    }

    fn dispatch(&mut self, i: usize, compensates: Option<TaskId>) -> ScheduledTask {
        let context = self.context.snapshot();
        let info = &self.tasks[i];
        info!(
            task = %info.id,
            attempt = info.attempts,
            task_type = %info.task_type,
            compensates = ?compensates,
            "dispatching task"
        );
        ScheduledTask {
            task_id: info.id.clone(),
            task_type: info.task_type.clone(),
            attempt: info.attempts,
            input: Arc::clone(&info.input),
            context,
            timeout: info.timeout,
            compensates,
        }
    }

    /// Completed tasks to compensate, most recently completed first.
    fn build_compensation_queue(&self, compensable_only: bool) -> VecDeque<(usize, usize)> {
        let graph = self.definition.graph();
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
        for &done in self.run.completion_order.iter().rev() {
            let info = &self.tasks[done];
            if compensable_only && !info.compensable {
                continue;
            }
            let Some(comp) = info
                .compensation_task_id
                .as_deref()
                .and_then(|id| graph.index_of(id))
            else {
                continue;
            };
            if queue.iter().any(|&(c, _)| c == comp) {
                continue;
            }
            queue.push_back((comp, done));
        }
        queue
    }

    fn next_compensation(&mut self) -> Option<ScheduledTask> {
        let compensable_only = self.run.rollback?;
        if self.run.cancel_requested {
            return None;
        }
        if self.run.compensation_queue.is_none() {
            let queue = self.build_compensation_queue(compensable_only);
            debug!(workflow = %self.workflow_id(), pending = queue.len(), "compensation queue built");
            self.run.compensation_queue = Some(queue);
        }
        let (comp, target) = self.run.compensation_queue.as_mut()?.pop_front()?;

        self.tasks[comp].attempts += 1;
        let target_id = self.tasks[target].id.clone();
        StateManager::new(&mut self.tasks, &mut self.audit).transition(
            comp,
            TaskStatus::Running,
            EventType::CompensationStarted,
            format!("compensating '{target_id}'"),
        );
        self.run.compensating = Some(target);
        Some(self.dispatch(comp, Some(target_id)))
    }

    fn compensation_pending(&self) -> bool {
        if self.run.rollback.is_none() || self.run.cancel_requested {
            return false;
        }
        match &self.run.compensation_queue {
            Some(queue) => !queue.is_empty(),
            None => true,
        }
    }

    /// Bring the run to a resting point after any input: re-evaluate
    /// readiness, admit, compensate, and finish (or restart) once nothing
    /// can make progress.
    fn settle(&mut self, step: &mut SchedulerStep) {
        loop {
            StateManager::new(&mut self.tasks, &mut self.audit)
                .evaluate_readiness(self.definition.graph(), self.context.values());
            step.newly_scheduled.extend(self.admit());

            let view = ReadOnlyStateManager::new(&self.tasks);
            if view.running_count() > 0 || view.any_held() {
                return;
            }
            if self.status == WorkflowStatus::Paused
                && (view.any_open() || self.compensation_pending())
            {
                return;
            }
            if let Some(task) = self.next_compensation() {
                step.newly_scheduled.push(task);
                return;
            }
            // Nothing runs, so nothing can change the context any more.
            if StateManager::new(&mut self.tasks, &mut self.audit).skip_unmet_conditions() > 0 {
                continue;
            }
            if self.finish_run(step) {
                continue;
            }
            return;
        }
    }

    /// Returns `true` if the run was restarted by a workflow-level retry.
    fn finish_run(&mut self, step: &mut SchedulerStep) -> bool {
        let mut states = StateManager::new(&mut self.tasks, &mut self.audit);
        states.skip_unused_compensations();
        if !ReadOnlyStateManager::new(&self.tasks).all_terminal() {
            warn!(workflow = %self.workflow_id(), "run drained with open tasks; cancelling them");
            StateManager::new(&mut self.tasks, &mut self.audit).cancel_open("no longer reachable");
        }

        if self.status.is_terminal() {
            debug!(workflow = %self.workflow_id(), status = %self.status, "run drained");
            step.finished = Some(self.status);
            return false;
        }

        let outcome = if self.run.failed {
            WorkflowStatus::Failed
        } else if self.run.cancel_requested {
            WorkflowStatus::Cancelled
        } else {
            WorkflowStatus::Completed
        };

        let max_retries = self.definition.max_retries();
        if outcome == WorkflowStatus::Failed && self.retries_attempted < max_retries {
            self.retries_attempted += 1;
            let attempt = self.retries_attempted;
            info!(workflow = %self.workflow_id(), attempt, max_retries, "restarting failed run");
            self.audit.record(
                EventType::WorkflowRetrying,
                format!("run failed; restart {attempt} of {max_retries}"),
                None,
            );
            self.reset_run();
            return true;
        }

        let count = |status: TaskStatus| {
            self.tasks
                .iter()
                .filter(|t| !t.compensation_only && t.status == status)
                .count()
        };
        let description = format!(
            "{} completed, {} failed, {} skipped, {} cancelled",
            count(TaskStatus::Completed),
            count(TaskStatus::Failed),
            count(TaskStatus::Skipped),
            count(TaskStatus::Cancelled)
        );
        let event = match outcome {
            WorkflowStatus::Completed => EventType::WorkflowCompleted,
            WorkflowStatus::Cancelled => EventType::WorkflowCancelled,
            _ => EventType::WorkflowFailed,
        };
        info!(workflow = %self.workflow_id(), status = %outcome, %description, "workflow finished");
        self.set_status(outcome, event, description);
        step.finished = Some(outcome);
        false
    }

    /// Put every task back to `PENDING` for a fresh run. Each task that had
    /// moved records one `TASK_RETRYING` event, since the reset bypasses the
    /// task state machine.
    fn reset_run(&mut self) {
        let restart = self.retries_attempted;
        for info in &mut self.tasks {
            if info.status != TaskStatus::Pending {
                self.audit.record(
                    EventType::TaskRetrying,
                    format!("reset from {} for workflow restart {restart}", info.status),
                    Some(&info.id),
                );
            }
            info.reset();
        }
        self.context.reset();
        self.run = RunFlags::default();
    }

    /// # Panics
    ///
    /// On a workflow transition the state machine does not allow.
    fn set_status(&mut self, next: WorkflowStatus, event: EventType, description: impl Into<String>) {
        if !self.status.can_transition_to(next) {
            panic!(
                "scheduler invariant violated: workflow '{}' cannot move from {} to {next}",
                self.definition.id(),
                self.status
            );
        }
        debug!(workflow = %self.workflow_id(), from = %self.status, to = %next, "workflow transition");
        self.status = next;
        self.audit.record(event, description, None);
    }
}
