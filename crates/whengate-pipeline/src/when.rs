//! When expressions: guards that decide whether a pipeline task runs.
//!
//! A task runs only if every guard `input <operator> values` holds. This
//! module validates guards before a definition is accepted: structure first,
//! then embedded result references ([`WhenExpressions::validate`]), and,
//! once the pipeline's parameters are known, parameter references
//! ([`WhenExpressions::validate_pipeline_parameters_variables`]).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use whengate_types::{
    FieldError, FieldErrorKind, PIPELINE_WHEN_PATH, TASKS_WHEN_PATH, TASK_WHEN_PATH,
};

use crate::result_ref::{
    extract_variable_expressions, looks_like_contains_result_refs, looks_like_result_ref,
    new_result_refs, ResultRef,
};
use crate::substitution::{
    validate_array_element_variable, validate_variable, validate_variable_prohibited,
};

/// Spellings of the operators a when expression may use, in the order they
/// are reported. These are the lowercase wire values of [`Operator::In`] and
/// [`Operator::NotIn`]; `In` and `NotIn` as written are not accepted.
pub const VALID_WHEN_OPERATORS: [&str; 2] = ["in", "notin"];

const WHEN_LOCATION: &str = "task when expression";

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Set-membership operator. Unknown spellings are kept verbatim so the
/// validator can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    In,
    NotIn,
    Unrecognized(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Unrecognized(s) => s,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl Default for Operator {
    fn default() -> Self {
        Operator::Unrecognized(String::new())
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            _ => Operator::Unrecognized(s),
        }
    }
}

impl From<&str> for Operator {
    fn from(s: &str) -> Self {
        Operator::from(s.to_string())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Unrecognized(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WhenExpression
// ---------------------------------------------------------------------------

/// A single guard: `input <operator> values`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhenExpression {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl WhenExpression {
    pub fn new(
        input: impl Into<String>,
        operator: impl Into<Operator>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            input: input.into(),
            operator: operator.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// True when every field is at its zero value.
    pub fn is_empty(&self) -> bool {
        self == &WhenExpression::default()
    }

    /// The inner expressions of every `$(...)` in `input` and then in each
    /// of `values`, in order.
    pub fn var_substitution_expressions(&self) -> Vec<&str> {
        std::iter::once(self.input.as_str())
            .chain(self.values.iter().map(String::as_str))
            .flat_map(extract_variable_expressions)
            .collect()
    }

    fn validate_fields(&self) -> Result<(), FieldError> {
        if self.is_empty() {
            return Err(FieldError::missing_field(TASK_WHEN_PATH));
        }
        if !self.operator.is_valid() {
            let message = format!(
                "operator {:?} is not recognized. valid operators: {}",
                self.operator.as_str(),
                VALID_WHEN_OPERATORS.join(",")
            );
            return Err(FieldError::invalid_value(
                FieldErrorKind::InvalidOperator,
                message,
                TASK_WHEN_PATH,
            ));
        }
        if self.values.is_empty() {
            return Err(FieldError::invalid_value(
                FieldErrorKind::EmptyValues,
                "expecting non-empty values field",
                TASK_WHEN_PATH,
            ));
        }
        Ok(())
    }

    fn validate_task_results_variables(&self) -> Result<(), FieldError> {
        let expressions = self.var_substitution_expressions();
        if expressions.is_empty() || !looks_like_contains_result_refs(&expressions) {
            return Ok(());
        }

        let candidates: Vec<&str> = expressions
            .into_iter()
            .filter(|e| looks_like_result_ref(e))
            .collect();
        let result_refs = new_result_refs(&candidates);
        tracing::debug!(
            candidates = candidates.len(),
            parsed = result_refs.len(),
            "Classified result references in when expression"
        );

        if candidates.len() != result_refs.len() {
            let parsed: Vec<String> = result_refs.iter().map(ToString::to_string).collect();
            let message = format!(
                "expected all of the expressions [{}] to be result expressions but only [{}] were",
                candidates.join(" "),
                parsed.join(" ")
            );
            return Err(FieldError::invalid_value(
                FieldErrorKind::MalformedReference,
                message,
                TASKS_WHEN_PATH,
            ));
        }
        Ok(())
    }

    fn validate_parameters_variables(
        &self,
        prefix: &str,
        param_names: &HashSet<String>,
        array_param_names: &HashSet<String>,
    ) -> Result<(), FieldError> {
        validate_string_variable(
            &format!("input[{}]", self.input),
            &self.input,
            prefix,
            param_names,
            array_param_names,
        )?;
        for value in &self.values {
            validate_string_variable(
                &format!("values[{value}]"),
                value,
                prefix,
                param_names,
                array_param_names,
            )?;
        }
        Ok(())
    }
}

/// Array parameters are rejected before undeclared ones so that an array
/// name used as a scalar is reported as such. A single element such as
/// `$(params.images[0])` is a scalar and must index a declared array.
fn validate_string_variable(
    name: &str,
    value: &str,
    prefix: &str,
    string_vars: &HashSet<String>,
    array_vars: &HashSet<String>,
) -> Result<(), FieldError> {
    validate_variable_prohibited(name, value, prefix, WHEN_LOCATION, PIPELINE_WHEN_PATH, array_vars)?;
    validate_variable(name, value, prefix, WHEN_LOCATION, PIPELINE_WHEN_PATH, string_vars)?;
    validate_array_element_variable(name, value, prefix, WHEN_LOCATION, PIPELINE_WHEN_PATH, array_vars)
}

// ---------------------------------------------------------------------------
// WhenExpressions
// ---------------------------------------------------------------------------

/// The ordered guards of one task. An empty list means "always run".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WhenExpressions(pub Vec<WhenExpression>);

impl<'de> Deserialize<'de> for WhenExpressions {
    /// `null` entries decode as empty guards so that validation rejects them
    /// the same way as `{}`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<Option<WhenExpression>>::deserialize(deserializer)?;
        Ok(Self(entries.into_iter().map(Option::unwrap_or_default).collect()))
    }
}

impl From<Vec<WhenExpression>> for WhenExpressions {
    fn from(v: Vec<WhenExpression>) -> Self {
        Self(v)
    }
}

impl WhenExpressions {
    pub fn iter(&self) -> std::slice::Iter<'_, WhenExpression> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structural checks, then result reference checks. Returns the first
    /// failure in declaration order.
    pub fn validate(&self) -> Result<(), FieldError> {
        self.validate_when_expressions_fields()?;
        self.validate_task_results_variables()?;
        Ok(())
    }

    pub fn validate_when_expressions_fields(&self) -> Result<(), FieldError> {
        for (index, we) in self.iter().enumerate() {
            we.validate_fields()
                .map_err(|err| err.with_details(format!("at when[{index}]")))?;
        }
        Ok(())
    }

    pub fn validate_task_results_variables(&self) -> Result<(), FieldError> {
        for (index, we) in self.iter().enumerate() {
            we.validate_task_results_variables()
                .map_err(|err| err.with_details(format!("at when[{index}]")))?;
        }
        Ok(())
    }

    /// Every `$(<prefix>.<name>)` in any input or value must name a declared
    /// string parameter; array parameters are rejected.
    pub fn validate_pipeline_parameters_variables(
        &self,
        prefix: &str,
        param_names: &HashSet<String>,
        array_param_names: &HashSet<String>,
    ) -> Result<(), FieldError> {
        for we in self.iter() {
            we.validate_parameters_variables(prefix, param_names, array_param_names)?;
        }
        Ok(())
    }

    /// Well-formed result references across all guards, deduplicated, in the
    /// order they first appear.
    pub fn result_refs(&self) -> Vec<ResultRef<'_>> {
        let mut seen = HashSet::new();
        self.iter()
            .flat_map(|we| {
                let candidates: Vec<&str> = we
                    .var_substitution_expressions()
                    .into_iter()
                    .filter(|e| looks_like_result_ref(e))
                    .collect();
                new_result_refs(&candidates)
            })
            .filter(|r| seen.insert(*r))
            .collect()
    }
}

impl<'a> IntoIterator for &'a WhenExpressions {
    type Item = &'a WhenExpression;
    type IntoIter = std::slice::Iter<'a, WhenExpression>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
