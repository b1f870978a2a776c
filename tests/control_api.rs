// tests/control_api.rs

mod common;
use crate::common::{TestResult, init_tracing, with_timeout};

use std::time::Duration;

use flowdag::{EventType, TaskStatus, WorkflowSnapshot, WorkflowStatus};
use flowdag_test_utils::builders::{WorkflowBuilder, task};
use flowdag_test_utils::scripted::{Script, ScriptedHandler};

fn task_is(snapshot: &WorkflowSnapshot, task: &str, status: TaskStatus) -> bool {
    snapshot.tasks.get(task).is_some_and(|t| t.status == status)
}

#[tokio::test]
async fn pause_twice_records_one_pause_and_holds_admission() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("pausable")
        .task(task("A", &[]))
        .task(task("B", &["A"]))
        .workflow();
    let handler = ScriptedHandler::new().script("A", Script::sleep(Duration::from_millis(150)));
    let log = handler.log();

    let handle = workflow.start(handler)?;
    with_timeout(handle.wait_until(|s| task_is(s, "A", TaskStatus::Running))).await;

    handle.pause().await;
    handle.pause().await;

    // A finishes while paused; B must not be admitted.
    let snapshot = with_timeout(handle.wait_until(|s| task_is(s, "A", TaskStatus::Completed))).await;
    assert_eq!(snapshot.status, WorkflowStatus::Paused);
    assert!(task_is(&snapshot, "B", TaskStatus::Ready));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(log.attempts("B"), 0);
    assert_eq!(handle.trail().count(EventType::WorkflowPaused), 1);

    handle.resume().await;
    handle.resume().await;

    let report = with_timeout(handle.wait()).await?;
    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(report.count(EventType::WorkflowPaused), 1);
    assert_eq!(report.count(EventType::WorkflowResumed), 1);
    assert_eq!(report.task_status("B"), Some(TaskStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("done")
        .task(task("A", &[]))
        .workflow();
    let handle = workflow.start(ScriptedHandler::new())?;

    let snapshot = with_timeout(handle.wait_until(|s| s.status.is_terminal())).await;
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    let events_before = handle.audit_trail().len();

    handle.cancel().await;
    handle.pause().await;

    assert_eq!(handle.status().status, WorkflowStatus::Completed);
    assert_eq!(handle.audit_trail().len(), events_before);

    let report = with_timeout(handle.wait()).await?;
    assert_eq!(report.status(), WorkflowStatus::Completed);
    assert_eq!(report.count(EventType::WorkflowCancelRequested), 0);
    assert_eq!(report.count(EventType::WorkflowCancelled), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_stops_running_handlers_and_unstarted_tasks() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("cancellable")
        .task(task("slow_a", &[]))
        .task(task("slow_b", &[]))
        .task(task("after", &["slow_a", "slow_b"]))
        .workflow();
    let handler = ScriptedHandler::new()
        .script("slow_a", Script::until_cancelled())
        .script("slow_b", Script::until_cancelled());
    let log = handler.log();

    let handle = workflow.start(handler)?;
    with_timeout(handle.wait_until(|s| {
        task_is(s, "slow_a", TaskStatus::Running) && task_is(s, "slow_b", TaskStatus::Running)
    }))
    .await;

    handle.cancel().await;
    handle.cancel().await;

    let report = with_timeout(handle.wait()).await?;
    assert_eq!(report.status(), WorkflowStatus::Cancelled);
    assert_eq!(report.task_status("slow_a"), Some(TaskStatus::Cancelled));
    assert_eq!(report.task_status("slow_b"), Some(TaskStatus::Cancelled));
    assert_eq!(report.task_status("after"), Some(TaskStatus::Cancelled));
    assert_eq!(report.count(EventType::WorkflowCancelRequested), 1);
    assert_eq!(report.count(EventType::WorkflowCancelled), 1);
    assert_eq!(log.attempts("after"), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_while_paused_finishes_cancelled() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("paused_then_cancelled")
        .task(task("A", &[]))
        .task(task("B", &["A"]))
        .workflow();
    let handler = ScriptedHandler::new().script("A", Script::until_cancelled());

    let handle = workflow.start(handler)?;
    with_timeout(handle.wait_until(|s| task_is(s, "A", TaskStatus::Running))).await;

    handle.pause().await;
    with_timeout(handle.wait_until(|s| s.status == WorkflowStatus::Paused)).await;
    handle.cancel().await;

    let report = with_timeout(handle.wait()).await?;
    assert_eq!(report.status(), WorkflowStatus::Cancelled);
    assert_eq!(report.task_status("A"), Some(TaskStatus::Cancelled));
    assert_eq!(report.task_status("B"), Some(TaskStatus::Cancelled));
    Ok(())
}

#[tokio::test]
async fn status_reports_progress_and_context() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("progress")
        .variable("region", "eu")
        .task(task("A", &[]))
        .task(task("B", &["A"]))
        .workflow();
    let handler = ScriptedHandler::new()
        .script("A", Script::ok().writes("rows", 12))
        .script("B", Script::until_cancelled());

    let handle = workflow.start(handler)?;
    assert_eq!(handle.workflow_id(), "progress");

    let snapshot = with_timeout(handle.wait_until(|s| task_is(s, "B", TaskStatus::Running))).await;
    assert_eq!(snapshot.status, WorkflowStatus::Running);
    assert_eq!(snapshot.progress_percentage, 50.0);
    assert_eq!(snapshot.context.get("rows"), Some(&flowdag::Value::Int(12)));
    assert_eq!(snapshot.context.get("region"), Some(&flowdag::Value::from("eu")));

    let trail = handle.audit_trail();
    assert!(trail.iter().all(|e| e.workflow_id() == "progress"));
    assert_eq!(trail[0].event_type(), EventType::WorkflowCreated);

    handle.cancel().await;
    let report = with_timeout(handle.wait()).await?;
    assert_eq!(report.status(), WorkflowStatus::Cancelled);
    assert_eq!(report.task_status("A"), Some(TaskStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn event_sinks_stream_the_whole_trail() -> TestResult {
    init_tracing();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<flowdag::AuditEvent>();
    let mut workflow = WorkflowBuilder::new("streamed")
        .task(task("A", &[]))
        .task(task("B", &["A"]))
        .workflow();
    workflow.add_event_sink(std::sync::Arc::new(tx));
    workflow.add_event_sink(std::sync::Arc::new(flowdag::TracingSink));

    let handle = workflow.start(ScriptedHandler::new())?;
    let report = with_timeout(handle.wait()).await?;

    let mut streamed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        streamed.push(event.event_id());
    }
    // Sinks only see events recorded after registration.
    let recorded: Vec<u64> = report.events.iter().map(|e| e.event_id()).skip(1).collect();
    assert_eq!(streamed, recorded);
    Ok(())
}
