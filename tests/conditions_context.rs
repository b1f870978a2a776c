// tests/conditions_context.rs

mod common;
use crate::common::{TestResult, init_tracing, position_of, run_to_end};

use std::time::Duration;

use flowdag::{
    EventType, ExecutionMode, TaskError, TaskOutput, TaskStatus, Value, WorkflowStatus, handler_fn,
};
use flowdag_test_utils::builders::{TaskBuilder, WorkflowBuilder, task};
use flowdag_test_utils::scripted::{Script, ScriptedHandler};

#[tokio::test]
async fn false_condition_skips_and_dependents_still_run() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("conditional")
        .variable("env", "dev")
        .task(task("build", &[]))
        .task(TaskBuilder::new("deploy").after("build").condition("env == prod").build())
        .task(task("notify", &["deploy"]))
        .workflow();
    let handler = ScriptedHandler::new();
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(report.task_status("deploy"), Some(TaskStatus::Skipped));
    assert_eq!(report.task_status("notify"), Some(TaskStatus::Completed));
    assert_eq!(log.attempts("deploy"), 0);

    let skipped = report
        .events
        .iter()
        .find(|e| e.event_type() == EventType::TaskSkipped)
        .ok_or("no skip event")?;
    assert_eq!(skipped.task_id(), Some("deploy"));
    assert!(skipped.description().contains("env == prod"), "{}", skipped.description());
    Ok(())
}

#[tokio::test]
async fn condition_sees_context_written_by_upstream_tasks() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("data_driven")
        .task(task("extract", &[]))
        .task(TaskBuilder::new("load").after("extract").condition("rows > 0").build())
        .task(TaskBuilder::new("alert").after("extract").condition("rows == 0").build())
        .workflow();
    let handler = ScriptedHandler::new()
        .script("extract", Script::ok().writes("rows", 42).outputs("file", "rows.csv"))
        .observe("rows");
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.task_status("load"), Some(TaskStatus::Completed));
    assert_eq!(report.task_status("alert"), Some(TaskStatus::Skipped));
    assert_eq!(
        report.snapshot.tasks["extract"].outputs.get("file"),
        Some(&Value::from("rows.csv"))
    );

    let load = log
        .invocations()
        .into_iter()
        .find(|i| i.task == "load")
        .ok_or("load never ran")?;
    assert_eq!(load.seen, Some(Value::Int(42)));

    let completed = report
        .events
        .iter()
        .find(|e| e.event_type() == EventType::TaskCompleted && e.task_id() == Some("extract"))
        .ok_or("extract never completed")?;
    assert!(completed.description().contains("rows"));
    Ok(())
}

#[tokio::test]
async fn waiting_condition_runs_once_context_changes() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("approval")
        .task(TaskBuilder::new("publish").condition("approved").wait_for_condition().build())
        .task(task("review", &[]))
        .workflow();
    let handler = ScriptedHandler::new().script(
        "review",
        Script::sleep(Duration::from_millis(20)).writes("approved", true),
    );

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(report.task_status("publish"), Some(TaskStatus::Completed));

    let waited = position_of(&report.events, EventType::TaskWaiting, "publish").ok_or("never waited")?;
    let reviewed = position_of(&report.events, EventType::TaskCompleted, "review").ok_or("review")?;
    let started = position_of(&report.events, EventType::TaskStarted, "publish").ok_or("publish")?;
    assert!(waited < reviewed && reviewed < started);
    Ok(())
}

#[tokio::test]
async fn waiting_condition_that_never_holds_is_skipped_at_the_end() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("never_approved")
        .task(TaskBuilder::new("publish").condition("approved").wait_for_condition().build())
        .task(task("after_publish", &["publish"]))
        .task(task("review", &[]))
        .workflow();

    let report = run_to_end(workflow, ScriptedHandler::new()).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(report.task_status("publish"), Some(TaskStatus::Skipped));
    assert_eq!(report.task_status("after_publish"), Some(TaskStatus::Completed));

    let skipped = report
        .events
        .iter()
        .find(|e| e.event_type() == EventType::TaskSkipped && e.task_id() == Some("publish"))
        .ok_or("publish never skipped")?;
    assert!(skipped.description().contains("never became true"));
    Ok(())
}

#[tokio::test]
async fn handlers_receive_input_and_outputs_are_kept() -> TestResult {
    init_tracing();

    let handler = handler_fn(|inv| async move {
        let Some(table) = inv.input("table").and_then(Value::as_str).map(str::to_string) else {
            return Err(TaskError::failed("missing table"));
        };
        Ok(
            TaskOutput::new()
                .with_output("table", table)
                .with_output("type", inv.task_type.clone()),
        )
    });

    let workflow = WorkflowBuilder::new("inputs")
        .task(
            TaskBuilder::new("copy")
                .task_type("sql")
                .input("table", "orders")
                .build(),
        )
        .workflow();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    let outputs = &report.snapshot.tasks["copy"].outputs;
    assert_eq!(outputs.get("table"), Some(&Value::from("orders")));
    assert_eq!(outputs.get("type"), Some(&Value::from("sql")));
    Ok(())
}

#[tokio::test]
async fn workflow_variables_seed_the_context() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("seeded")
        .variable("threshold", 10)
        .task(task("check", &[]))
        .task(TaskBuilder::new("big").after("check").condition("threshold >= 10").build())
        .workflow();
    let handler = ScriptedHandler::new().observe("threshold");
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.task_status("big"), Some(TaskStatus::Completed));
    assert!(log.invocations().iter().all(|i| i.seen == Some(Value::Int(10))));
    assert_eq!(report.snapshot.context.get("threshold"), Some(&Value::Int(10)));
    Ok(())
}

#[tokio::test]
async fn queued_ready_task_is_rechecked_after_a_context_commit() -> TestResult {
    init_tracing();

    // Both start READY; sequential admission keeps `guarded` queued while
    // `flip` runs and turns the flag off.
    let workflow = WorkflowBuilder::new("recheck")
        .mode(ExecutionMode::Sequential)
        .variable("flag", true)
        .task(task("flip", &[]))
        .task(TaskBuilder::new("guarded").condition("flag").build())
        .workflow();
    let handler = ScriptedHandler::new().script("flip", Script::ok().writes("flag", false));
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(report.task_status("guarded"), Some(TaskStatus::Skipped));
    assert_eq!(log.attempts("guarded"), 0);
    let ready = position_of(&report.events, EventType::TaskReady, "guarded").ok_or("never ready")?;
    let flipped = position_of(&report.events, EventType::TaskCompleted, "flip").ok_or("flip")?;
    let skipped = position_of(&report.events, EventType::TaskSkipped, "guarded").ok_or("skip")?;
    assert!(ready < flipped && flipped < skipped);
    Ok(())
}

#[tokio::test]
async fn queued_waiting_task_goes_back_to_waiting_when_its_condition_turns_false() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("recheck_wait")
        .mode(ExecutionMode::Sequential)
        .variable("flag", true)
        .task(task("flip", &[]))
        .task(
            TaskBuilder::new("guarded")
                .condition("flag")
                .wait_for_condition()
                .build(),
        )
        .workflow();
    let handler = ScriptedHandler::new().script("flip", Script::ok().writes("flag", false));
    let log = handler.log();

    let report = run_to_end(workflow, handler).await?;

    assert_eq!(log.attempts("guarded"), 0);
    assert_eq!(report.task_status("guarded"), Some(TaskStatus::Skipped));
    let waited = position_of(&report.events, EventType::TaskWaiting, "guarded").ok_or("never waited")?;
    let flipped = position_of(&report.events, EventType::TaskCompleted, "flip").ok_or("flip")?;
    assert!(flipped < waited);
    Ok(())
}
