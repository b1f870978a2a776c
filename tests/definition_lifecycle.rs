// tests/definition_lifecycle.rs

mod common;
use crate::common::{TestResult, event_types, init_tracing, run_to_end};

use std::sync::Arc;

use flowdag::audit::AuditLog;
use flowdag::config::{from_toml_str, load_and_validate, to_toml_string};
use flowdag::dag::Scheduler;
use flowdag::{
    BackoffKind, ErrorStrategy, EventType, ExecutionMode, FlowdagError, Priority,
    ValidationError, Workflow, WorkflowDefinition, WorkflowStatus,
};
use flowdag_test_utils::builders::{TaskBuilder, WorkflowBuilder, task};
use flowdag_test_utils::scripted::ScriptedHandler;

const PIPELINE: &str = r#"
id = "nightly"
execution_mode = "parallel"
max_parallel_tasks = 2
error_strategy = "compensate"
max_retries = 1

[retry_backoff]
kind = "exponential"
delay = "50ms"
max_delay = "1s"

[variables]
region = "eu"
batch = 500

[dependencies]
report = ["load"]

[[task]]
id = "extract"
type = "sql"
priority = "high"
max_retries = 2
timeout = "30s"

[[task]]
id = "audit"
type = "http"

[[task]]
id = "load"
type = "sql"
dependencies = ["extract"]
condition = "batch > 0"
compensation_task_id = "unload"
compensable = true

[task.input]
table = "orders"

[[task]]
id = "report"
type = "email"
allow_failure = true

[[task]]
id = "unload"
type = "sql"
"#;

/// Ids admitted by the first scheduling step of a fresh scheduler.
fn initial_ready_set(definition: WorkflowDefinition) -> Vec<String> {
    let audit = AuditLog::new(definition.id().to_string());
    let mut scheduler = Scheduler::new(Arc::new(definition), audit);
    let step = scheduler.start();
    step.scheduled_ids().into_iter().map(str::to_string).collect()
}

#[test]
fn toml_definition_is_parsed_with_defaults() -> TestResult {
    let raw = from_toml_str(PIPELINE)?;

    assert_eq!(raw.id, "nightly");
    assert_eq!(raw.execution_mode, ExecutionMode::Parallel);
    assert_eq!(raw.error_strategy, ErrorStrategy::Compensate);
    assert!(!raw.continue_on_error);
    assert_eq!(raw.tasks.len(), 5);

    let extract = &raw.tasks[0];
    assert_eq!(extract.priority, Priority::High);
    assert_eq!(extract.max_retries, 2);
    assert!(extract.skip_on_condition);

    let backoff = raw.retry_backoff.as_ref().ok_or("missing backoff")?;
    assert_eq!(backoff.kind, BackoffKind::Exponential);

    let definition = WorkflowDefinition::try_from(raw)?;
    assert_eq!(definition.graph().len(), 5);
    assert_eq!(definition.graph().edge_count(), 2);
    Ok(())
}

#[test]
fn serialized_draft_reloads_to_the_same_ready_order() -> TestResult {
    init_tracing();

    let original = WorkflowBuilder::new("roundtrip")
        .mode(ExecutionMode::Sequential)
        .variable("flag", true)
        .task(TaskBuilder::new("low").priority(Priority::Low).build())
        .task(task("first", &[]))
        .task(TaskBuilder::new("urgent").priority(Priority::Critical).build())
        .task(task("second", &[]))
        .task(task("joined", &["first", "second"]))
        .dependency("joined", "urgent")
        .build_raw();

    let text = to_toml_string(&original)?;
    let reloaded = from_toml_str(&text)?;
    assert_eq!(reloaded, original);

    let before = initial_ready_set(WorkflowDefinition::try_from(original)?);
    let after = initial_ready_set(WorkflowDefinition::try_from(reloaded)?);
    assert_eq!(before, vec!["urgent"]);
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn full_ready_sets_match_after_reload() -> TestResult {
    let original = from_toml_str(PIPELINE)?;
    let reloaded = from_toml_str(&to_toml_string(&original)?)?;

    let before = initial_ready_set(WorkflowDefinition::try_from(original)?);
    let after = initial_ready_set(WorkflowDefinition::try_from(reloaded)?);
    // max_parallel_tasks = 2: the high-priority task goes first.
    assert_eq!(before, vec!["extract", "audit"]);
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn definition_files_load_from_disk() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nightly.toml");
    std::fs::write(&path, PIPELINE)?;

    let definition = load_and_validate(&path)?;
    assert_eq!(definition.id(), "nightly");

    let workflow = Workflow::load(&path)?;
    assert_eq!(workflow.status(), WorkflowStatus::Draft);
    assert_eq!(workflow.definition().tasks.len(), 5);

    let missing = Workflow::load(dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(FlowdagError::IoError(_))));
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let result = Workflow::from_toml_str("id = [unclosed");
    assert!(matches!(result, Err(FlowdagError::TomlError(_))));
}

#[test]
fn validation_moves_draft_to_ready() -> TestResult {
    let mut workflow = WorkflowBuilder::new("valid")
        .task(task("a", &[]))
        .task(task("b", &["a"]))
        .workflow();
    assert_eq!(workflow.status(), WorkflowStatus::Draft);

    workflow.definition_mut()?.tasks.push(task("c", &["b"]));
    workflow.validate()?;
    assert_eq!(workflow.status(), WorkflowStatus::Ready);

    // Frozen once validated.
    assert!(matches!(
        workflow.definition_mut(),
        Err(FlowdagError::InvalidState(_))
    ));

    assert_eq!(
        event_types(&workflow.audit_trail().events()),
        vec![
            EventType::WorkflowCreated,
            EventType::WorkflowValidating,
            EventType::WorkflowReady
        ]
    );
    Ok(())
}

fn rejected(workflow: &mut Workflow) -> Option<ValidationError> {
    match workflow.validate() {
        Err(FlowdagError::Validation(err)) => Some(err),
        _ => None,
    }
}

#[test]
fn cycles_fail_validation_and_never_run() {
    let mut workflow = WorkflowBuilder::new("cyclic")
        .task(task("a", &["c"]))
        .task(task("b", &["a"]))
        .task(task("c", &["b"]))
        .workflow();

    let err = rejected(&mut workflow);
    assert!(matches!(err, Some(ValidationError::Cycle(_))), "{err:?}");
    assert_eq!(workflow.status(), WorkflowStatus::Failed);

    let trail = workflow.audit_trail();
    assert_eq!(trail.count(EventType::WorkflowFailed), 1);
    assert_eq!(trail.count(EventType::WorkflowStarted), 0);

    // A failed validation is final.
    assert!(matches!(workflow.validate(), Err(FlowdagError::InvalidState(_))));
}

#[test]
fn unknown_and_duplicate_tasks_are_rejected() {
    let mut unknown = WorkflowBuilder::new("unknown")
        .task(task("a", &["ghost"]))
        .workflow();
    assert_eq!(
        rejected(&mut unknown),
        Some(ValidationError::UnknownDependency {
            task: "a".to_string(),
            dependency: "ghost".to_string(),
        })
    );

    let mut duplicate = WorkflowBuilder::new("duplicate")
        .task(task("a", &[]))
        .task(task("a", &[]))
        .workflow();
    assert_eq!(
        rejected(&mut duplicate),
        Some(ValidationError::DuplicateTask("a".to_string()))
    );

    let mut dangling_map = WorkflowBuilder::new("dangling")
        .task(task("a", &[]))
        .dependency("nobody", "a")
        .workflow();
    assert_eq!(
        rejected(&mut dangling_map),
        Some(ValidationError::UnknownTask("nobody".to_string()))
    );
}

#[test]
fn missing_fields_and_bad_values_are_rejected() {
    let mut no_id = WorkflowBuilder::new("").task(task("a", &[])).workflow();
    assert!(matches!(
        rejected(&mut no_id),
        Some(ValidationError::MissingField(_))
    ));

    let mut bad_condition = WorkflowBuilder::new("bad_condition")
        .task(TaskBuilder::new("a").condition("x >").build())
        .workflow();
    assert!(matches!(
        rejected(&mut bad_condition),
        Some(ValidationError::InvalidCondition { .. })
    ));

    let mut bad_backoff = WorkflowBuilder::new("bad_backoff")
        .backoff(BackoffKind::Fixed, "soon")
        .task(task("a", &[]))
        .workflow();
    assert!(matches!(
        rejected(&mut bad_backoff),
        Some(ValidationError::InvalidField { .. })
    ));

    let mut huge_timeout = WorkflowBuilder::new("huge_timeout")
        .task(TaskBuilder::new("a").timeout("307445734561825861m").build())
        .workflow();
    assert!(matches!(
        rejected(&mut huge_timeout),
        Some(ValidationError::InvalidField { .. })
    ));

    let mut huge_backoff = WorkflowBuilder::new("huge_backoff")
        .backoff(BackoffKind::Fixed, "5124095576030432h")
        .task(task("a", &[]))
        .workflow();
    assert!(matches!(
        rejected(&mut huge_backoff),
        Some(ValidationError::InvalidField { .. })
    ));
}

#[tokio::test]
async fn starting_an_invalid_workflow_returns_the_validation_error() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("broken")
        .task(task("a", &["a"]))
        .workflow();

    let result = workflow.start(ScriptedHandler::new());
    assert!(matches!(
        result,
        Err(FlowdagError::Validation(ValidationError::Cycle(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn full_event_sequence_of_a_single_task_run() -> TestResult {
    init_tracing();

    let workflow = WorkflowBuilder::new("single").task(task("only", &[])).workflow();
    let report = run_to_end(workflow, ScriptedHandler::new()).await?;

    assert_eq!(
        event_types(&report.events),
        vec![
            EventType::WorkflowCreated,
            EventType::WorkflowValidating,
            EventType::WorkflowReady,
            EventType::WorkflowStarted,
            EventType::TaskReady,
            EventType::TaskStarted,
            EventType::TaskCompleted,
            EventType::WorkflowCompleted,
        ]
    );
    Ok(())
}
