//! Parameter substitution checks: `$(params.<name>)` references against the
//! declared parameter names.
//!
//! A reference may carry an index. `$(params.images[*])` is the whole array
//! and `$(params.images[0])` is a single element, which is a scalar.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use whengate_types::{FieldError, FieldErrorKind};

static PREFIXED_VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\(([_a-zA-Z][_a-zA-Z0-9\-]*)\.([_a-zA-Z][_a-zA-Z0-9.\-]*)(?:\[([0-9]+|\*)\])?\)",
    )
    .expect("valid prefixed variable regex")
});

/// A `$(<prefix>.<name>)` reference with its index stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableRef<'a> {
    pub name: &'a str,
    /// `true` for a positional index such as `[0]`.
    pub element: bool,
}

/// Every `$(<prefix>.<name>)` reference in `value`, in order of appearance.
pub fn extract_variable_refs<'a>(value: &'a str, prefix: &str) -> Vec<VariableRef<'a>> {
    PREFIXED_VARIABLE_RE
        .captures_iter(value)
        .filter(|caps| caps.get(1).is_some_and(|p| p.as_str() == prefix))
        .filter_map(|caps| {
            let name = caps.get(2)?.as_str();
            let element = caps.get(3).is_some_and(|i| i.as_str() != "*");
            Some(VariableRef { name, element })
        })
        .collect()
}

/// Extract the variable names referenced as `$(<prefix>.<name>)` in `value`,
/// in order of appearance. Any `[*]` or `[N]` index is stripped.
pub fn extract_variables<'a>(value: &'a str, prefix: &str) -> Vec<&'a str> {
    extract_variable_refs(value, prefix)
        .into_iter()
        .map(|v| v.name)
        .collect()
}

fn undeclared(
    name: &str,
    value: &str,
    prefix: &str,
    location: &str,
    path: &str,
    details: String,
) -> FieldError {
    FieldError::new(
        FieldErrorKind::UndefinedParameter,
        format!("non-existent variable in {value:?} for {location} {name}"),
        format!("{path}.{name}"),
    )
    .with_details(format!("{prefix} {details}"))
}

/// Every unindexed `$(<prefix>.<name>)` in `value` must name a member of `vars`.
///
/// `name` identifies the operand (e.g. `input[$(params.x)]`) and is appended
/// to `path` in the reported error. Element references are checked by
/// [`validate_array_element_variable`].
pub fn validate_variable(
    name: &str,
    value: &str,
    prefix: &str,
    location: &str,
    path: &str,
    vars: &HashSet<String>,
) -> Result<(), FieldError> {
    match extract_variable_refs(value, prefix)
        .into_iter()
        .find(|v| !v.element && !vars.contains(v.name))
    {
        Some(var) => Err(undeclared(
            name,
            value,
            prefix,
            location,
            path,
            format!("{:?} is not declared", var.name),
        )),
        None => Ok(()),
    }
}

/// Every `$(<prefix>.<name>[N])` in `value` must index a member of `array_vars`.
pub fn validate_array_element_variable(
    name: &str,
    value: &str,
    prefix: &str,
    location: &str,
    path: &str,
    array_vars: &HashSet<String>,
) -> Result<(), FieldError> {
    match extract_variable_refs(value, prefix)
        .into_iter()
        .find(|v| v.element && !array_vars.contains(v.name))
    {
        Some(var) => Err(undeclared(
            name,
            value,
            prefix,
            location,
            path,
            format!("{:?} is not declared as an array", var.name),
        )),
        None => Ok(()),
    }
}

/// No whole-value `$(<prefix>.<name>)` or `$(<prefix>.<name>[*])` in `value`
/// may name a member of `vars`. Single elements are allowed.
pub fn validate_variable_prohibited(
    name: &str,
    value: &str,
    prefix: &str,
    location: &str,
    path: &str,
    vars: &HashSet<String>,
) -> Result<(), FieldError> {
    match extract_variable_refs(value, prefix)
        .into_iter()
        .find(|v| !v.element && vars.contains(v.name))
    {
        Some(var) => Err(FieldError::new(
            FieldErrorKind::ProhibitedArrayReference,
            format!("variable type invalid in {value:?} for {location} {name}"),
            format!("{path}.{name}"),
        )
        .with_details(format!(
            "{prefix} {:?} is an array and cannot be used as a scalar operand",
            var.name
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_only_matching_prefix() {
        let vars = extract_variables(
            "$(params.branch)/$(tasks.a.results.b)/$(context.pipelineRun.name)/$(params.images[*])",
            "params",
        );
        assert_eq!(vars, vec!["branch", "images"]);
    }

    #[test]
    fn extracts_indexed_references() {
        let refs = extract_variable_refs("$(params.images[0])-$(params.images[*])-$(params.x)", "params");
        assert_eq!(
            refs,
            vec![
                VariableRef { name: "images", element: true },
                VariableRef { name: "images", element: false },
                VariableRef { name: "x", element: false },
            ]
        );
    }

    #[test]
    fn extract_nothing_from_literal() {
        assert!(extract_variables("main", "params").is_empty());
    }

    #[test]
    fn declared_variable_passes() {
        let vars = names(&["branch"]);
        assert!(validate_variable("input[x]", "$(params.branch)", "params", "loc", "p", &vars).is_ok());
        assert!(validate_variable("input[x]", "literal", "params", "loc", "p", &vars).is_ok());
    }

    #[test]
    fn undeclared_variable_fails_with_path() {
        let vars = names(&["branch"]);
        let err = validate_variable(
            "input[$(params.missing)]",
            "$(params.missing)",
            "params",
            "task when expression",
            "pipelinespec.when",
            &vars,
        )
        .unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::UndefinedParameter);
        assert_eq!(err.paths, vec!["pipelinespec.when.input[$(params.missing)]"]);
        assert_eq!(
            err.message,
            "non-existent variable in \"$(params.missing)\" for task when expression input[$(params.missing)]"
        );
        assert_eq!(err.details.as_deref(), Some("params \"missing\" is not declared"));
    }

    #[test]
    fn prohibited_variable_fails() {
        let arrays = names(&["images"]);
        let err = validate_variable_prohibited(
            "values[$(params.images[*])]",
            "$(params.images[*])",
            "params",
            "task when expression",
            "pipelinespec.when",
            &arrays,
        )
        .unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::ProhibitedArrayReference);
        assert!(err.message.starts_with("variable type invalid in"));
    }

    #[test]
    fn prohibited_ignores_scalars() {
        let arrays = names(&["images"]);
        assert!(
            validate_variable_prohibited("n", "$(params.branch)", "params", "loc", "p", &arrays)
                .is_ok()
        );
    }

    #[test]
    fn element_of_undeclared_array_fails() {
        let arrays = names(&["images"]);
        let err = validate_array_element_variable(
            "input[$(params.missing[0])]",
            "$(params.missing[0])",
            "params",
            "task when expression",
            "pipelinespec.when",
            &arrays,
        )
        .unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::UndefinedParameter);
        assert_eq!(err.paths, vec!["pipelinespec.when.input[$(params.missing[0])]"]);
        assert_eq!(
            err.details.as_deref(),
            Some("params \"missing\" is not declared as an array")
        );
    }

    #[test]
    fn element_of_declared_array_is_scalar() {
        let arrays = names(&["images"]);
        let value = "$(params.images[0])";
        assert!(validate_array_element_variable("n", value, "params", "loc", "p", &arrays).is_ok());
        assert!(validate_variable_prohibited("n", value, "params", "loc", "p", &arrays).is_ok());
        assert!(validate_variable("n", value, "params", "loc", "p", &names(&[])).is_ok());
    }
}
