// src/policy/strategy.rs

//! What happens after a task attempt fails.
//!
//! Decisions are pure functions of the facts the scheduler hands in; the
//! scheduler carries them out and records them in the audit log.

use crate::errors::TaskError;
use crate::types::ErrorStrategy;

/// Facts about a failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct FailureFacts<'a> {
    pub error: &'a TaskError,
    pub retry_count: u32,
    pub max_retries: u32,
    pub allow_failure: bool,
    /// The workflow is cancelling or has already decided to fail.
    pub halting: bool,
    pub continue_on_error: bool,
    pub strategy: ErrorStrategy,
}

/// Workflow-level consequence of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyAction {
    /// Stop admitting, cancel unstarted tasks, fail once running work drains.
    Halt,
    /// Cancel the failed task's dependents and keep going.
    BlockDependents,
    /// Halt, then compensate completed tasks in reverse completion order.
    Rollback { compensable_only: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Requeue the task; `retry_count` is the new count.
    Retry { retry_count: u32 },
    /// Terminal failure that satisfies dependents (`allow_failure`).
    Tolerate,
    /// Terminal failure; dependents blocked, no strategy applied.
    Record,
    /// Terminal failure handled by the workflow's error strategy.
    Apply(StrategyAction),
}

pub fn decide(facts: FailureFacts<'_>) -> FailureDecision {
    let retryable = !matches!(facts.error, TaskError::Cancelled);

    if retryable && !facts.halting && facts.retry_count < facts.max_retries {
        return FailureDecision::Retry {
            retry_count: facts.retry_count + 1,
        };
    }

    if facts.allow_failure {
        return FailureDecision::Tolerate;
    }

    if facts.halting || facts.continue_on_error {
        return FailureDecision::Record;
    }

    FailureDecision::Apply(action_for(facts.strategy))
}

pub fn action_for(strategy: ErrorStrategy) -> StrategyAction {
    match strategy {
        ErrorStrategy::FailFast => StrategyAction::Halt,
        ErrorStrategy::Continue | ErrorStrategy::Retry => StrategyAction::BlockDependents,
        ErrorStrategy::Rollback => StrategyAction::Rollback {
            compensable_only: false,
        },
        ErrorStrategy::Compensate => StrategyAction::Rollback {
            compensable_only: true,
        },
    }
}
