//! A `TaskHandler` whose behaviour is scripted per task, and which records
//! what actually ran.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flowdag::exec::{HandlerFuture, TaskHandler, TaskInvocation, TaskOutput};
use flowdag::{TaskError, Value};

/// What one task does when invoked.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Fail this many attempts before succeeding.
    pub fail_times: u32,
    /// Fail every attempt.
    pub always_fail: bool,
    /// Time spent "working" per attempt.
    pub delay: Duration,
    /// Ignore the delay and wait until the workflow is cancelled.
    pub until_cancelled: bool,
    pub context_updates: Vec<(String, Value)>,
    pub outputs: Vec<(String, Value)>,
}

impl Script {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn fail() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn fail_times(n: u32) -> Self {
        Self {
            fail_times: n,
            ..Self::default()
        }
    }

    pub fn sleep(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn until_cancelled() -> Self {
        Self {
            until_cancelled: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn writes(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context_updates.push((key.to_string(), value.into()));
        self
    }

    pub fn outputs(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.outputs.push((key.to_string(), value.into()));
        self
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub task: String,
    pub attempt: u32,
    pub compensates: Option<String>,
    pub started: Instant,
    pub finished: Option<Instant>,
    /// The handler saw the context key `seen_key` with this value.
    pub seen: Option<Value>,
}

#[derive(Debug, Default)]
struct LogInner {
    invocations: Vec<Invocation>,
    running: usize,
    max_running: usize,
}

/// Shared record of everything a [`ScriptedHandler`] ran.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ExecutionLog {
    fn begin(&self, invocation: Invocation) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.running += 1;
        inner.max_running = inner.max_running.max(inner.running);
        inner.invocations.push(invocation);
        inner.invocations.len() - 1
    }

    fn end(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.running -= 1;
        inner.invocations[index].finished = Some(Instant::now());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.lock().unwrap().invocations.clone()
    }

    /// Task ids in start order, one entry per attempt.
    pub fn started(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.task).collect()
    }

    pub fn attempts(&self, task: &str) -> usize {
        self.invocations().iter().filter(|i| i.task == task).count()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.lock().unwrap().max_running
    }

    /// Start of the first attempt of `task`.
    pub fn first_start(&self, task: &str) -> Option<Instant> {
        self.invocations()
            .iter()
            .find(|i| i.task == task)
            .map(|i| i.started)
    }

    /// End of the last attempt of `task`.
    pub fn last_finish(&self, task: &str) -> Option<Instant> {
        self.invocations()
            .iter()
            .rev()
            .find(|i| i.task == task)
            .and_then(|i| i.finished)
    }
}

/// Handler driven by per-task [`Script`]s. Unscripted tasks succeed at once.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHandler {
    scripts: HashMap<String, Script>,
    log: ExecutionLog,
    seen_key: Option<String>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, task: &str, script: Script) -> Self {
        self.scripts.insert(task.to_string(), script);
        self
    }

    /// Record the value of this context key as seen by each invocation.
    pub fn observe(mut self, key: &str) -> Self {
        self.seen_key = Some(key.to_string());
        self
    }

    pub fn log(&self) -> ExecutionLog {
        self.log.clone()
    }
}

impl TaskHandler for ScriptedHandler {
    fn execute(&self, invocation: TaskInvocation) -> HandlerFuture<'_> {
        Box::pin(async move {
            let script = self
                .scripts
                .get(&invocation.task_id)
                .cloned()
                .unwrap_or_default();
            let seen = self
                .seen_key
                .as_deref()
                .and_then(|key| invocation.context.get(key).cloned());

            let index = self.log.begin(Invocation {
                task: invocation.task_id.clone(),
                attempt: invocation.attempt,
                compensates: invocation.compensates.clone(),
                started: Instant::now(),
                finished: None,
                seen,
            });

            let result = run_script(&script, &invocation).await;
            self.log.end(index);
            result
        })
    }
}

async fn run_script(script: &Script, invocation: &TaskInvocation) -> Result<TaskOutput, TaskError> {
    if script.until_cancelled {
        invocation.cancel.cancelled().await;
        return Err(TaskError::Cancelled);
    }

    if !script.delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(script.delay) => {}
            _ = invocation.cancel.cancelled() => return Err(TaskError::Cancelled),
        }
    }

    if script.always_fail || invocation.attempt <= script.fail_times {
        return Err(TaskError::failed(format!(
            "scripted failure of '{}' on attempt {}",
            invocation.task_id, invocation.attempt
        )));
    }

    let mut output = TaskOutput::new();
    for (key, value) in &script.outputs {
        output = output.with_output(key.clone(), value.clone());
    }
    for (key, value) in &script.context_updates {
        output = output.with_context(key.clone(), value.clone());
    }
    Ok(output)
}
