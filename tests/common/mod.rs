#![allow(dead_code)]

use std::error::Error;

use flowdag::{AuditEvent, EventType, TaskHandler, Workflow, WorkflowReport};
pub use flowdag_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Start `workflow` with `handler` and wait (bounded) for it to finish.
pub async fn run_to_end<H: TaskHandler>(
    workflow: Workflow,
    handler: H,
) -> Result<WorkflowReport, Box<dyn Error>> {
    let handle = workflow.start(handler)?;
    let report = with_timeout(handle.wait()).await?;
    Ok(report)
}

/// Event types of a trail, in order.
pub fn event_types(events: &[AuditEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type()).collect()
}

/// Position of the first event of `event_type` for `task`.
pub fn position_of(events: &[AuditEvent], event_type: EventType, task: &str) -> Option<usize> {
    events
        .iter()
        .position(|e| e.event_type() == event_type && e.task_id() == Some(task))
}
