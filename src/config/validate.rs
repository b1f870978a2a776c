// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{CompiledTask, RawWorkflowDefinition, WorkflowDefinition};
use crate::context::Condition;
use crate::dag::TaskGraph;
use crate::engine::TaskId;
use crate::errors::ValidationError;
use crate::policy::BackoffPolicy;
use crate::types::parse_duration;

type Result<T> = std::result::Result<T, ValidationError>;

impl TryFrom<RawWorkflowDefinition> for WorkflowDefinition {
    type Error = ValidationError;

    fn try_from(raw: RawWorkflowDefinition) -> Result<Self> {
        ensure_required_fields(&raw)?;
        validate_settings(&raw)?;
        let backoff = compile_backoff(&raw)?;

        let graph = TaskGraph::build(raw.tasks.clone(), &raw.dependencies)?;
        let compensation_only = validate_compensation(&graph)?;

        let compiled = graph
            .tasks()
            .iter()
            .map(|task| {
                let condition = match &task.condition {
                    Some(src) => Some(Condition::parse(src).map_err(|reason| {
                        ValidationError::InvalidCondition {
                            task: task.id.clone(),
                            condition: src.clone(),
                            reason,
                        }
                    })?),
                    None => None,
                };
                let timeout = match &task.timeout {
                    Some(src) => Some(parse_duration(src).map_err(|reason| {
                        ValidationError::InvalidField {
                            field: format!("task '{}' timeout", task.id),
                            reason,
                        }
                    })?),
                    None => None,
                };
                Ok(CompiledTask {
                    condition,
                    timeout,
                    compensation_only: compensation_only.contains(&task.id),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WorkflowDefinition::new_unchecked(raw, graph, compiled, backoff))
    }
}

/// Run every check without keeping the result.
pub fn validate_definition(raw: &RawWorkflowDefinition) -> Result<()> {
    WorkflowDefinition::try_from(raw.clone()).map(|_| ())
}

fn ensure_required_fields(raw: &RawWorkflowDefinition) -> Result<()> {
    if raw.id.trim().is_empty() {
        return Err(ValidationError::MissingField("workflow id".to_string()));
    }
    if raw.tasks.is_empty() {
        return Err(ValidationError::NoTasks);
    }
    for (i, task) in raw.tasks.iter().enumerate() {
        if task.id.trim().is_empty() {
            return Err(ValidationError::MissingField(format!("task #{i} id")));
        }
        if task.task_type.trim().is_empty() {
            return Err(ValidationError::MissingField(format!(
                "task '{}' type",
                task.id
            )));
        }
        if task.compensable && task.compensation_task_id.is_none() {
            return Err(ValidationError::MissingField(format!(
                "task '{}' is compensable but has no compensation_task_id",
                task.id
            )));
        }
    }
    Ok(())
}

fn validate_settings(raw: &RawWorkflowDefinition) -> Result<()> {
    if raw.max_parallel_tasks == 0 {
        return Err(ValidationError::InvalidField {
            field: "max_parallel_tasks".to_string(),
            reason: "must be >= 1 (got 0)".to_string(),
        });
    }
    Ok(())
}

fn compile_backoff(raw: &RawWorkflowDefinition) -> Result<Option<BackoffPolicy>> {
    let Some(spec) = &raw.retry_backoff else {
        return Ok(None);
    };
    let invalid = |reason: String| ValidationError::InvalidField {
        field: "retry_backoff".to_string(),
        reason,
    };
    let delay = parse_duration(&spec.delay).map_err(invalid)?;
    let max_delay = spec
        .max_delay
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(invalid)?;
    Ok(Some(BackoffPolicy::new(spec.kind, delay, max_delay)))
}

/// Check compensation references and return the set of compensation-only
/// tasks.
fn validate_compensation(graph: &TaskGraph) -> Result<HashSet<TaskId>> {
    let mut compensation_only = HashSet::new();

    for task in graph.tasks() {
        let Some(target) = &task.compensation_task_id else {
            continue;
        };
        if !graph.contains(target) {
            return Err(ValidationError::InvalidField {
                field: format!("task '{}' compensation_task_id", task.id),
                reason: format!("unknown task '{target}'"),
            });
        }
        if target == &task.id {
            return Err(ValidationError::InvalidField {
                field: format!("task '{}' compensation_task_id", task.id),
                reason: "a task cannot compensate itself".to_string(),
            });
        }
        compensation_only.insert(target.clone());
    }

    for id in &compensation_only {
        let field = format!("compensation task '{id}'");
        if !graph.dependencies_of(id).is_empty() || !graph.dependents_of(id).is_empty() {
            return Err(ValidationError::InvalidField {
                field,
                reason: "compensation tasks cannot take part in dependency edges".to_string(),
            });
        }
        if graph
            .task(id)
            .is_some_and(|t| t.compensation_task_id.is_some())
        {
            return Err(ValidationError::InvalidField {
                field,
                reason: "compensation tasks cannot declare their own compensation".to_string(),
            });
        }
    }

    Ok(compensation_only)
}
