// src/dag/state_manager.rs

//! Per-run task state transitions.
//!
//! Every task transition goes through [`StateManager::transition`], which
//! checks it against the task state machine and appends exactly one audit
//! event for it.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};

use crate::audit::{AuditLog, EventType};
use crate::context::Value;
use crate::dag::graph::TaskGraph;
use crate::dag::status::TaskStatus;
use crate::dag::task_info::TaskInfo;
use crate::engine::TaskId;

/// Mutable view over the task table of one run, plus the audit log.
pub struct StateManager<'a> {
    tasks: &'a mut [TaskInfo],
    audit: &'a mut AuditLog,
}

impl<'a> StateManager<'a> {
    pub fn new(tasks: &'a mut [TaskInfo], audit: &'a mut AuditLog) -> Self {
        Self { tasks, audit }
    }

    /// Move task `i` to `next` and record `event`.
    ///
    /// # Panics
    ///
    /// On a move the task state machine does not allow. The scheduler is the
    /// only writer, so this is a bug in the scheduler rather than a runtime
    /// condition.
    pub fn transition(
        &mut self,
        i: usize,
        next: TaskStatus,
        event: EventType,
        description: impl Into<String>,
    ) {
        let info = &mut self.tasks[i];
        let prev = info.status;
        if !prev.can_transition_to(next) {
            panic!(
                "scheduler invariant violated: task '{}' cannot move from {prev} to {next}",
                info.id
            );
        }
        info.status = next;
        debug!(task = %info.id, from = %prev, to = %next, "task transition");
        self.audit.record(event, description, Some(&info.id));
    }

    /// Re-evaluate every open, schedulable task against its dependencies and
    /// condition until nothing changes. `READY` tasks are included: a context
    /// commit can turn their condition false before they are admitted.
    ///
    /// - a task with a blocking dependency (non-tolerated failure or
    ///   cancellation) is cancelled;
    /// - a task with satisfied dependencies and a true (or no) condition
    ///   becomes `READY`;
    /// - with a false condition it is skipped, or waits when
    ///   `skip_on_condition` is off (a `READY` task goes back to waiting);
    /// - anything else waits.
    ///
    /// Skips and cancellations can unlock or block further tasks, hence the
    /// fixpoint.
    ///
    /// `graph` is the graph the task table was built from, in the same order.
    pub fn evaluate_readiness(
        &mut self,
        graph: &TaskGraph,
        context: &BTreeMap<String, Value>,
    ) -> usize {
        let mut total = 0;
        loop {
            let changed = self.evaluate_once(graph, context);
            total += changed;
            if changed == 0 {
                return total;
            }
        }
    }

    fn evaluate_once(&mut self, graph: &TaskGraph, context: &BTreeMap<String, Value>) -> usize {
        let satisfied = self.satisfied_set();
        let tasks = &*self.tasks;
        let deps_met: HashSet<TaskId> = graph
            .ready_set(&satisfied, |id| {
                graph
                    .index_of(id)
                    .is_some_and(|i| tasks[i].status.is_open())
            })
            .into_iter()
            .collect();
        let blocking: HashSet<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.blocks_dependents())
            .map(|t| t.id.clone())
            .collect();

        let mut changed = 0;
        for i in 0..self.tasks.len() {
            let info = &self.tasks[i];
            if info.compensation_only
                || info.held_for_backoff
                || !info.status.is_open()
            {
                continue;
            }

            if let Some(dep) = info.deps.iter().find(|d| blocking.contains(*d)) {
                let description = format!("blocked by dependency '{dep}'");
                self.transition(i, TaskStatus::Cancelled, EventType::TaskCancelled, description);
                changed += 1;
                continue;
            }

            if !deps_met.contains(&info.id) {
                if info.status == TaskStatus::Pending {
                    let unmet: Vec<&str> = info
                        .deps
                        .iter()
                        .filter(|d| !satisfied.contains(*d))
                        .map(String::as_str)
                        .collect();
                    let description = format!("waiting on {}", unmet.join(", "));
                    self.transition(i, TaskStatus::Waiting, EventType::TaskWaiting, description);
                }
                continue;
            }

            match &info.condition {
                Some(condition) if !condition.evaluate(context) => {
                    if info.skip_on_condition {
                        let description = format!("condition '{condition}' is false");
                        self.transition(i, TaskStatus::Skipped, EventType::TaskSkipped, description);
                        changed += 1;
                    } else if info.status != TaskStatus::Waiting {
                        let description = format!("waiting for condition '{condition}'");
                        self.transition(i, TaskStatus::Waiting, EventType::TaskWaiting, description);
                    } else {
                        trace!(task = %info.id, %condition, "condition still false");
                    }
                }
                _ if info.status == TaskStatus::Ready => {}
                _ => {
                    let description = if info.deps.is_empty() {
                        "no dependencies".to_string()
                    } else {
                        "dependencies satisfied".to_string()
                    };
                    self.transition(i, TaskStatus::Ready, EventType::TaskReady, description);
                }
            }
        }
        changed
    }

    /// Skip waiting tasks whose dependencies are all satisfied but whose
    /// condition never became true. Only meaningful once nothing else can
    /// change the context.
    pub fn skip_unmet_conditions(&mut self) -> usize {
        let satisfied = self.satisfied_set();
        let stuck: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                !t.compensation_only
                    && t.status == TaskStatus::Waiting
                    && t.deps.iter().all(|d| satisfied.contains(d))
            })
            .map(|(i, _)| i)
            .collect();

        for &i in &stuck {
            let description = match &self.tasks[i].condition {
                Some(condition) => format!("condition '{condition}' never became true"),
                None => "no longer reachable".to_string(),
            };
            self.transition(i, TaskStatus::Skipped, EventType::TaskSkipped, description);
        }
        stuck.len()
    }

    /// Cancel every open schedulable task. Returns the cancelled ids.
    pub fn cancel_open(&mut self, reason: &str) -> Vec<TaskId> {
        let open: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.compensation_only && t.status.is_open())
            .map(|(i, _)| i)
            .collect();

        let mut cancelled = Vec::with_capacity(open.len());
        for i in open {
            self.tasks[i].held_for_backoff = false;
            self.transition(i, TaskStatus::Cancelled, EventType::TaskCancelled, reason);
            cancelled.push(self.tasks[i].id.clone());
        }
        cancelled
    }

    /// Close out compensation tasks that were never needed in this run.
    pub fn skip_unused_compensations(&mut self) {
        let unused: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.compensation_only && t.status == TaskStatus::Pending)
            .map(|(i, _)| i)
            .collect();
        for i in unused {
            self.transition(
                i,
                TaskStatus::Skipped,
                EventType::TaskSkipped,
                "compensation not required",
            );
        }
    }

    fn satisfied_set(&self) -> HashSet<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.satisfies_dependents())
            .map(|t| t.id.clone())
            .collect()
    }
}

/// Read-only helpers over the task table.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a [TaskInfo],
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a [TaskInfo]) -> Self {
        Self { tasks }
    }

    fn schedulable(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.iter().filter(|t| !t.compensation_only)
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    pub fn any_held(&self) -> bool {
        self.tasks.iter().any(|t| t.held_for_backoff)
    }

    pub fn any_open(&self) -> bool {
        self.schedulable().any(|t| t.status.is_open())
    }

    /// Whether every schedulable task reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.schedulable().all(|t| t.status.is_terminal())
    }

    /// Depth of the shallowest schedulable task that is not finished.
    pub fn shallowest_unfinished_depth(&self) -> Option<usize> {
        self.schedulable()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.depth)
            .min()
    }

    /// Percentage of schedulable tasks in a terminal state.
    pub fn progress_percentage(&self) -> f64 {
        let total = self.schedulable().count();
        if total == 0 {
            return 100.0;
        }
        let done = self.schedulable().filter(|t| t.status.is_terminal()).count();
        (done as f64 / total as f64) * 100.0
    }
}
