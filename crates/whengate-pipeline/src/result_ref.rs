//! Variable substitution extraction and task result references.
//!
//! Grammar:
//! ```text
//! Substitution ::= '$(' Expression ')'
//! Expression   ::= Segment ( '.' Segment )* Index?
//! ResultRef    ::= 'tasks' '.' TaskName '.' 'results' '.' ResultName Index?
//! Index        ::= '[' Digits ']' | '[*]'
//! ```
//!
//! Two matchers work together: [`looks_like_result_ref`] is the broad check
//! that decides whether an expression is meant as a result reference, and
//! [`ResultRef::parse`] is the strict grammar. An expression that passes the
//! first but not the second is malformed.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// First segment of a result reference.
pub const RESULT_TASK_PART: &str = "tasks";

/// Third segment of a result reference.
pub const RESULT_RESULT_PART: &str = "results";

static VARIABLE_SUBSTITUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(([_a-zA-Z0-9.\-]+(?:\[(?:[0-9]+|\*)\])?)\)").expect("valid substitution regex")
});

/// Extract the inner expression of every `$(...)` substitution in `value`,
/// in order of appearance. `"a-$(params.x)-$(tasks.t.results.r)"` yields
/// `["params.x", "tasks.t.results.r"]`.
pub fn extract_variable_expressions(value: &str) -> Vec<&str> {
    VARIABLE_SUBSTITUTION_RE
        .captures_iter(value)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Broad check: is this expression meant to address a task result?
///
/// True for anything under `tasks.<name>.` with at least three segments, and
/// for legacy `task*...result*` spellings. Parameter and context references
/// never match.
pub fn looks_like_result_ref(expression: &str) -> bool {
    let mut segments = expression.split('.');
    let first = segments.next().unwrap_or_default();
    if first == RESULT_TASK_PART && segments.count() >= 2 {
        return true;
    }
    expression.starts_with("task") && expression.contains(".result")
}

/// Returns `true` if any of `expressions` looks like a result reference.
pub fn looks_like_contains_result_refs(expressions: &[&str]) -> bool {
    expressions.iter().any(|e| looks_like_result_ref(e))
}

/// Optional indexing applied to an array result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultIndex {
    /// `[N]`
    Position(usize),
    /// `[*]`
    All,
}

/// A parsed `tasks.<task>.results.<result>` reference, borrowing from the
/// expression it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultRef<'a> {
    pub pipeline_task: &'a str,
    pub result: &'a str,
    pub index: Option<ResultIndex>,
}

/// Why an expression failed the strict result reference grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultRefError {
    #[error("must look like tasks.<taskName>.results.<resultName>, got {0}")]
    Shape(String),

    #[error("empty {segment} name in {expression}")]
    EmptyName {
        segment: &'static str,
        expression: String,
    },

    #[error("invalid index in {0}")]
    Index(String),
}

impl<'a> ResultRef<'a> {
    /// Parse an expression (without the surrounding `$(` `)`) strictly.
    pub fn parse(expression: &'a str) -> Result<Self, ResultRefError> {
        let segments: Vec<&'a str> = expression.split('.').collect();
        if segments.len() != 4
            || segments[0] != RESULT_TASK_PART
            || segments[2] != RESULT_RESULT_PART
        {
            return Err(ResultRefError::Shape(expression.to_string()));
        }

        let pipeline_task = segments[1];
        if pipeline_task.is_empty() {
            return Err(ResultRefError::EmptyName {
                segment: "task",
                expression: expression.to_string(),
            });
        }

        let (result, index) = split_index(segments[3])
            .ok_or_else(|| ResultRefError::Index(expression.to_string()))?;
        if result.is_empty() {
            return Err(ResultRefError::EmptyName {
                segment: "result",
                expression: expression.to_string(),
            });
        }

        Ok(Self {
            pipeline_task,
            result,
            index,
        })
    }
}

impl fmt::Display for ResultRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{RESULT_TASK_PART}.{}.{RESULT_RESULT_PART}.{}",
            self.pipeline_task, self.result
        )?;
        match self.index {
            Some(ResultIndex::Position(i)) => write!(f, "[{i}]"),
            Some(ResultIndex::All) => f.write_str("[*]"),
            None => Ok(()),
        }
    }
}

/// Split `name[idx]` into its name and index. `None` if the brackets are
/// misplaced or the index is not a number or `*`.
fn split_index(segment: &str) -> Option<(&str, Option<ResultIndex>)> {
    let Some(open) = segment.find('[') else {
        return (!segment.contains(']')).then_some((segment, None));
    };
    let name = &segment[..open];
    let inner = segment[open + 1..].strip_suffix(']')?;
    let index = match inner {
        "*" => ResultIndex::All,
        digits if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            ResultIndex::Position(digits.parse().ok()?)
        }
        _ => return None,
    };
    Some((name, Some(index)))
}

/// Parse every expression that satisfies the strict grammar, skipping the
/// rest. Callers compare the lengths to detect malformed references.
pub fn new_result_refs<'a>(expressions: &[&'a str]) -> Vec<ResultRef<'a>> {
    expressions
        .iter()
        .filter_map(|e| ResultRef::parse(e).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_substitutions_in_order() {
        let found = extract_variable_expressions("a-$(params.x)-$(tasks.t.results.r)-b");
        assert_eq!(found, vec!["params.x", "tasks.t.results.r"]);
    }

    #[test]
    fn plain_strings_have_no_substitutions() {
        assert!(extract_variable_expressions("foo").is_empty());
        assert!(extract_variable_expressions("$foo (bar)").is_empty());
        assert!(extract_variable_expressions("$()").is_empty());
    }

    #[test]
    fn extracts_indexed_substitution() {
        let found = extract_variable_expressions("$(tasks.t.results.list[*])");
        assert_eq!(found, vec!["tasks.t.results.list[*]"]);
    }

    #[test]
    fn loose_matcher() {
        assert!(looks_like_result_ref("tasks.build.results.image"));
        assert!(looks_like_result_ref("tasks.build.image"));
        assert!(looks_like_result_ref("task.build.results"));
        assert!(!looks_like_result_ref("params.branch"));
        assert!(!looks_like_result_ref("tasks.build"));
        assert!(!looks_like_result_ref("context.pipelineRun.name"));
    }

    #[test]
    fn contains_result_refs() {
        assert!(looks_like_contains_result_refs(&["params.a", "tasks.b.results.c"]));
        assert!(!looks_like_contains_result_refs(&["params.a", "params.b"]));
        assert!(!looks_like_contains_result_refs(&[]));
    }

    #[test]
    fn parse_well_formed_reference() {
        let r = ResultRef::parse("tasks.build.results.image").unwrap();
        assert_eq!(r.pipeline_task, "build");
        assert_eq!(r.result, "image");
        assert_eq!(r.index, None);
        assert_eq!(r.to_string(), "tasks.build.results.image");
    }

    #[test]
    fn parse_indexed_reference() {
        let r = ResultRef::parse("tasks.scan.results.digests[2]").unwrap();
        assert_eq!(r.result, "digests");
        assert_eq!(r.index, Some(ResultIndex::Position(2)));

        let all = ResultRef::parse("tasks.scan.results.digests[*]").unwrap();
        assert_eq!(all.index, Some(ResultIndex::All));
        assert_eq!(all.to_string(), "tasks.scan.results.digests[*]");
    }

    #[test]
    fn parse_rejects_missing_results_segment() {
        assert!(matches!(
            ResultRef::parse("tasks.build.image"),
            Err(ResultRefError::Shape(_))
        ));
        assert!(matches!(
            ResultRef::parse("tasks.build.outputs.image"),
            Err(ResultRefError::Shape(_))
        ));
        assert!(matches!(
            ResultRef::parse("tasks.build.results.image.extra"),
            Err(ResultRefError::Shape(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_names_and_bad_index() {
        assert!(matches!(
            ResultRef::parse("tasks..results.image"),
            Err(ResultRefError::EmptyName { segment: "task", .. })
        ));
        assert!(matches!(
            ResultRef::parse("tasks.build.results.[0]"),
            Err(ResultRefError::EmptyName { segment: "result", .. })
        ));
        assert!(matches!(
            ResultRef::parse("tasks.build.results.list[x]"),
            Err(ResultRefError::Index(_))
        ));
        assert!(matches!(
            ResultRef::parse("tasks.build.results.li]st"),
            Err(ResultRefError::Index(_))
        ));
    }

    #[test]
    fn new_result_refs_skips_unparseable() {
        let refs = new_result_refs(&["tasks.a.results.x", "tasks.a.x", "params.p"]);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].pipeline_task, "a");
    }
}
