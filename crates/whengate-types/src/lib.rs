//! Shared error types for the whengate guard validator.
//!
//! - `FieldError`: a structured validation rejection pointing at a field path
//! - `FieldErrorKind`: the rejection taxonomy
//! - `WhengateError`: unified error type for loading and admitting pipelines

use std::fmt;

use serde::Serialize;

/// Path reported by structural checks on a task's when expressions.
pub const TASK_WHEN_PATH: &str = "spec.task.when";

/// Path reported when result references inside when expressions are malformed.
pub const TASKS_WHEN_PATH: &str = "spec.tasks.when";

/// Path root for parameter references inside when expressions.
pub const PIPELINE_WHEN_PATH: &str = "pipelinespec.when";

// ---------------------------------------------------------------------------
// FieldError, a single validation rejection
// ---------------------------------------------------------------------------

/// Classification of a [`FieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// An expression is entirely absent or zero-valued.
    MissingField,
    /// The operator is not one of the recognized operators.
    InvalidOperator,
    /// The values list is empty.
    EmptyValues,
    /// A substring looked like a result reference but did not parse as one.
    MalformedReference,
    /// A parameter reference names a parameter that is not declared.
    UndefinedParameter,
    /// A parameter reference names an array parameter in a scalar position.
    ProhibitedArrayReference,
    /// A result reference names a task whose results the referring task
    /// cannot read (undeclared, itself, or a finally task).
    UnknownResultTask,
}

/// A validation rejection: what went wrong, and where in the definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl FieldError {
    /// A required field is missing (or zero-valued) at `path`.
    pub fn missing_field(path: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorKind::MissingField,
            message: "missing field(s)".into(),
            paths: vec![path.into()],
            details: None,
        }
    }

    /// The value at `path` is invalid; `value` describes the offending value.
    pub fn invalid_value(
        kind: FieldErrorKind,
        value: impl fmt::Display,
        path: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: format!("invalid value: {value}"),
            paths: vec![path.into()],
            details: None,
        }
    }

    /// A rejection with a free-form message (no `invalid value:` prefix).
    pub fn new(kind: FieldErrorKind, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            paths: vec![path.into()],
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.message, self.paths.join(", "))?;
        if let Some(details) = &self.details {
            write!(f, "\n{details}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldError {}

// ---------------------------------------------------------------------------
// WhengateError, loading and admission failures
// ---------------------------------------------------------------------------

/// Unified error type for all whengate subsystems.
#[derive(Debug, thiserror::Error)]
pub enum WhengateError {
    // === Validation ===
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("task '{task}': {source}")]
    Task {
        task: String,
        #[source]
        source: FieldError,
    },

    // === Loading ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WhengateError {
    /// The underlying field error for validation rejections.
    pub fn field_error(&self) -> Option<&FieldError> {
        match self {
            WhengateError::Field(err) | WhengateError::Task { source: err, .. } => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if resubmitting the same definition can never succeed.
    pub fn is_terminal(&self) -> bool {
        self.field_error().is_some()
            || matches!(self, WhengateError::Yaml(_) | WhengateError::Json(_))
    }

    /// Maps the error to an HTTP status code for admission webhooks.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            WhengateError::Field(_) | WhengateError::Task { .. } => Some(400),
            WhengateError::Yaml(_) | WhengateError::Json(_) => Some(422),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, WhengateError>`.
pub type Result<T> = std::result::Result<T, WhengateError>;
