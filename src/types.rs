use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the scheduler admits ready tasks.
///
/// - `Sequential`: at most one task running at any time.
/// - `Parallel`: up to `max_parallel_tasks` running tasks.
/// - `Hybrid`: parallel up to `max_parallel_tasks`, with one extra rule of
///   flowdag's own: only tasks at the shallowest dependency depth that still
///   has unfinished work are admitted (a stage barrier). It can therefore
///   admit fewer tasks than `Parallel` would.
/// - `Dynamic`: re-decided on every tick from the run-context variable
///   [`DYNAMIC_MODE_VARIABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    Hybrid,
    Dynamic,
}

/// Run-context key consulted by [`ExecutionMode::Dynamic`].
///
/// A text value naming a concrete mode (`"sequential"`, `"parallel"` or
/// `"hybrid"`) selects it; anything else, or no value, admits in parallel.
pub const DYNAMIC_MODE_VARIABLE: &str = "flowdag.execution_mode";

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Parallel
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Hybrid => "hybrid",
            ExecutionMode::Dynamic => "dynamic",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            "hybrid" => Ok(ExecutionMode::Hybrid),
            "dynamic" => Ok(ExecutionMode::Dynamic),
            other => Err(format!(
                "invalid execution_mode: {other} (expected sequential, parallel, hybrid or dynamic)"
            )),
        }
    }
}

/// Workflow-level reaction to a task that failed with its retries exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Fail the workflow immediately; running tasks finish, nothing new starts.
    FailFast,
    /// Record the failure, block its dependents, let independent work proceed.
    Continue,
    /// Rely on per-task retries, then behave like `Continue`.
    Retry,
    /// Halt, then run every completed task's compensation in reverse order.
    Rollback,
    /// Like `Rollback`, restricted to tasks marked `compensable`.
    Compensate,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        ErrorStrategy::FailFast
    }
}

impl fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorStrategy::FailFast => "fail_fast",
            ErrorStrategy::Continue => "continue",
            ErrorStrategy::Retry => "retry",
            ErrorStrategy::Rollback => "rollback",
            ErrorStrategy::Compensate => "compensate",
        };
        f.write_str(s)
    }
}

impl FromStr for ErrorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(ErrorStrategy::FailFast),
            "continue" => Ok(ErrorStrategy::Continue),
            "retry" => Ok(ErrorStrategy::Retry),
            "rollback" => Ok(ErrorStrategy::Rollback),
            "compensate" => Ok(ErrorStrategy::Compensate),
            other => Err(format!(
                "invalid error_strategy: {other} (expected fail_fast, continue, retry, rollback or compensate)"
            )),
        }
    }
}

/// Task priority used to break ties between ready tasks.
///
/// Declared lowest first so that the derived `Ord` ranks `Critical` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Deferred,
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Deferred => "deferred",
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Shape of the delay between a task failure and its retry becoming eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Retry backoff as written in a workflow definition.
///
/// ```toml
/// [retry_backoff]
/// kind = "exponential"
/// delay = "100ms"
/// max_delay = "5s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoff {
    pub kind: BackoffKind,
    pub delay: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<String>,
}

/// Parse a duration string such as `"250ms"`, `"3s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
