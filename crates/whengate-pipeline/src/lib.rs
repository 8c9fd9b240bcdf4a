//! When-expression validation for pipeline definitions.
//!
//! This crate implements the static checks a pipeline goes through before it
//! is admitted: guard structure, embedded task result references, pipeline
//! parameter references, and the result reference targets across tasks.

pub mod definition;
pub mod result_ref;
pub mod substitution;
pub mod validation;
pub mod when;

pub use definition::{
    load_pipeline, parse_pipeline, parse_pipeline_json, ObjectMeta, ParamCatalog, ParamSpec, ParamType, ParamValue,
    Pipeline, PipelineSpec, PipelineTask, TaskRef,
};
pub use result_ref::{
    extract_variable_expressions, looks_like_contains_result_refs, looks_like_result_ref,
    new_result_refs, ResultIndex, ResultRef, ResultRefError,
};
pub use substitution::{
    extract_variable_refs, extract_variables, validate_array_element_variable, validate_variable,
    validate_variable_prohibited, VariableRef,
};
pub use validation::{
    result_dependencies, validate_pipeline, validate_task_when, TaskSection, PARAMS_PREFIX,
};
pub use when::{Operator, WhenExpression, WhenExpressions, VALID_WHEN_OPERATORS};
