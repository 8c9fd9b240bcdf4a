//! Pipeline admission: when-expression checks across every task.
//!
//! [`validate_pipeline`] runs, for each task in `tasks` and then `finally`:
//! the structural and result-reference pass, the parameter pass against the
//! pipeline's declared parameters, and a check that every result reference
//! names another task in `tasks`. The first failure rejects the pipeline.

use std::collections::HashSet;

use whengate_types::{FieldError, FieldErrorKind, WhengateError, TASKS_WHEN_PATH};

use crate::definition::{ParamCatalog, PipelineSpec, PipelineTask};

/// Variable namespace for pipeline parameters, as in `$(params.branch)`.
pub const PARAMS_PREFIX: &str = "params";

/// Which list a task was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSection {
    Tasks,
    Finally,
}

// ---------------------------------------------------------------------------
// Per-task checks
// ---------------------------------------------------------------------------

/// Validate one task's guards against the pipeline it belongs to.
pub fn validate_task_when(
    task: &PipelineTask,
    section: TaskSection,
    spec: &PipelineSpec,
    catalog: &ParamCatalog,
) -> Result<(), FieldError> {
    task.when.validate()?;
    task.when.validate_pipeline_parameters_variables(
        PARAMS_PREFIX,
        &catalog.string_names,
        &catalog.array_names,
    )?;
    validate_result_ref_targets(task, section, spec)
}

/// Result references must point at another task declared in `tasks`.
/// Finally tasks run last, so nothing may depend on their results.
fn validate_result_ref_targets(
    task: &PipelineTask,
    section: TaskSection,
    spec: &PipelineSpec,
) -> Result<(), FieldError> {
    let refs = task.when.result_refs();
    if !refs.is_empty() {
        tracing::debug!(
            task = %task.name,
            refs = ?refs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Checking result reference targets"
        );
    }

    for r in refs {
        let problem = if section == TaskSection::Tasks && r.pipeline_task == task.name {
            Some(format!("task {:?} cannot reference its own result {r}", task.name))
        } else if spec.task(r.pipeline_task).is_some() {
            None
        } else if spec.finally_task(r.pipeline_task).is_some() {
            Some(format!(
                "{r} references finally task {:?}, whose results are not available to other tasks",
                r.pipeline_task
            ))
        } else {
            Some(format!(
                "{r} references task {:?} which is not declared in the pipeline",
                r.pipeline_task
            ))
        };

        if let Some(message) = problem {
            return Err(FieldError::invalid_value(
                FieldErrorKind::UnknownResultTask,
                message,
                TASKS_WHEN_PATH,
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Admit or reject a pipeline based on its tasks' when expressions.
pub fn validate_pipeline(spec: &PipelineSpec) -> whengate_types::Result<()> {
    let catalog = spec.param_catalog();
    let sections = spec
        .tasks
        .iter()
        .map(|t| (t, TaskSection::Tasks))
        .chain(spec.finally.iter().map(|t| (t, TaskSection::Finally)));

    for (task, section) in sections {
        tracing::debug!(task = %task.name, ?section, guards = task.when.len(), "Validating when expressions");
        if let Err(source) = validate_task_when(task, section, spec, &catalog) {
            tracing::warn!(task = %task.name, error = %source, "Pipeline rejected");
            return Err(WhengateError::Task {
                task: task.name.clone(),
                source,
            });
        }
    }

    tracing::info!(
        tasks = spec.tasks.len(),
        finally = spec.finally.len(),
        "Pipeline when expressions are valid"
    );
    Ok(())
}

/// Names of the tasks each task's guards read results from, in declaration
/// order. Tasks without result references are omitted.
pub fn result_dependencies(spec: &PipelineSpec) -> Vec<(&str, Vec<&str>)> {
    spec.tasks
        .iter()
        .chain(spec.finally.iter())
        .filter_map(|t| {
            let mut seen = HashSet::new();
            let deps: Vec<&str> = t
                .when
                .result_refs()
                .into_iter()
                .map(|r| r.pipeline_task)
                .filter(|name| seen.insert(*name))
                .collect();
            (!deps.is_empty()).then_some((t.name.as_str(), deps))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
