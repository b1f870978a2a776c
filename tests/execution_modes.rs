// tests/execution_modes.rs

mod common;
use crate::common::{TestResult, init_tracing, position_of, run_to_end};

use std::time::Duration;

use flowdag::types::DYNAMIC_MODE_VARIABLE;
use flowdag::{EventType, ExecutionMode, Priority, WorkflowStatus};
use flowdag_test_utils::builders::{TaskBuilder, WorkflowBuilder, task};
use flowdag_test_utils::scripted::{Script, ScriptedHandler};

fn independent(mode: ExecutionMode, ids: &[&str]) -> (WorkflowBuilder, ScriptedHandler) {
    let mut builder = WorkflowBuilder::new("modes").mode(mode).max_parallel(4);
    let mut handler = ScriptedHandler::new();
    for id in ids {
        builder = builder.task(task(id, &[]));
        handler = handler.script(id, Script::sleep(Duration::from_millis(30)));
    }
    (builder, handler)
}

#[tokio::test]
async fn sequential_runs_one_task_at_a_time() -> TestResult {
    init_tracing();

    let (builder, handler) = independent(ExecutionMode::Sequential, &["a", "b", "c"]);
    let log = handler.log();

    let report = run_to_end(builder.workflow(), handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(log.max_concurrency(), 1);
    assert_eq!(log.started(), vec!["a", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn parallel_runs_independent_tasks_together() -> TestResult {
    init_tracing();

    let (builder, handler) = independent(ExecutionMode::Parallel, &["a", "b", "c"]);
    let log = handler.log();

    let report = run_to_end(builder.workflow(), handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(log.max_concurrency(), 3);
    Ok(())
}

#[tokio::test]
async fn higher_priority_is_admitted_first() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("priorities")
        .mode(ExecutionMode::Sequential)
        .task(TaskBuilder::new("low").priority(Priority::Low).build())
        .task(task("normal", &[]))
        .task(TaskBuilder::new("critical").priority(Priority::Critical).build())
        .task(TaskBuilder::new("also_normal").build())
        .workflow();
    let handler = ScriptedHandler::new();
    let log = handler.log();

    run_to_end(workflow, handler).await?;

    // Equal priorities keep definition order.
    assert_eq!(log.started(), vec!["critical", "normal", "also_normal", "low"]);
    Ok(())
}

#[tokio::test]
async fn hybrid_finishes_a_depth_before_starting_the_next() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("stages")
        .mode(ExecutionMode::Hybrid)
        .task(task("fast", &[]))
        .task(task("slow", &[]))
        .task(task("after_fast", &["fast"]))
        .workflow();
    let handler = ScriptedHandler::new().script("slow", Script::sleep(Duration::from_millis(60)));
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    let slow_done = position_of(&report.events, EventType::TaskCompleted, "slow").ok_or("slow")?;
    let next_started =
        position_of(&report.events, EventType::TaskStarted, "after_fast").ok_or("after_fast")?;
    assert!(next_started > slow_done);
    assert_eq!(log.started().last().map(String::as_str), Some("after_fast"));
    Ok(())
}

#[tokio::test]
async fn parallel_does_not_wait_for_the_whole_depth() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("no_stages")
        .mode(ExecutionMode::Parallel)
        .task(task("fast", &[]))
        .task(task("slow", &[]))
        .task(task("after_fast", &["fast"]))
        .workflow();
    let handler = ScriptedHandler::new().script("slow", Script::sleep(Duration::from_millis(150)));

    let report = run_to_end(workflow, handler).await?;

    let slow_done = position_of(&report.events, EventType::TaskCompleted, "slow").ok_or("slow")?;
    let next_started =
        position_of(&report.events, EventType::TaskStarted, "after_fast").ok_or("after_fast")?;
    assert!(next_started < slow_done);
    Ok(())
}

#[tokio::test]
async fn dynamic_follows_the_context_variable() -> TestResult {
    init_tracing();

    let (builder, handler) = independent(ExecutionMode::Dynamic, &["a", "b", "c"]);
    let log = handler.log();
    let workflow = builder.variable(DYNAMIC_MODE_VARIABLE, "sequential").workflow();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(log.max_concurrency(), 1);
    assert!(
        report
            .events
            .iter()
            .filter(|e| e.event_type() == EventType::TaskStarted)
            .all(|e| e.description().contains("sequential mode"))
    );
    Ok(())
}

#[tokio::test]
async fn dynamic_defaults_to_parallel() -> TestResult {
    init_tracing();

    let (builder, handler) = independent(ExecutionMode::Dynamic, &["a", "b", "c"]);
    let log = handler.log();

    let report = run_to_end(builder.workflow(), handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(log.max_concurrency(), 3);
    Ok(())
}

#[tokio::test]
async fn dynamic_switches_mode_when_a_task_writes_it() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("switching")
        .mode(ExecutionMode::Dynamic)
        .task(task("gate", &[]))
        .task(task("x", &["gate"]))
        .task(task("y", &["gate"]))
        .task(task("z", &["gate"]))
        .workflow();
    let sleepy = || Script::sleep(Duration::from_millis(20));
    let handler = ScriptedHandler::new()
        .script("gate", Script::ok().writes(DYNAMIC_MODE_VARIABLE, "sequential"))
        .script("x", sleepy())
        .script("y", sleepy())
        .script("z", sleepy());
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(log.max_concurrency(), 1);
    assert_eq!(log.started(), vec!["gate", "x", "y", "z"]);
    Ok(())
}
