use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use whengate_types::WhengateError;

use crate::when::WhenExpressions;

/// A `Pipeline` resource document. Only the fields the guard validator
/// reads are modelled; everything else is ignored on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub tasks: Vec<PipelineTask>,
    #[serde(default)]
    pub finally: Vec<PipelineTask>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    #[default]
    String,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Array(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_after: Vec<String>,
    #[serde(default, skip_serializing_if = "WhenExpressions::is_empty")]
    pub when: WhenExpressions,
}

// ---------------------------------------------------------------------------
// Parameter catalog
// ---------------------------------------------------------------------------

/// Declared parameter names, split by type. The two sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamCatalog {
    pub string_names: HashSet<String>,
    pub array_names: HashSet<String>,
}

impl ParamCatalog {
    pub fn from_params(params: &[ParamSpec]) -> Self {
        let mut catalog = Self::default();
        for p in params {
            match p.param_type {
                ParamType::String => catalog.string_names.insert(p.name.clone()),
                ParamType::Array => catalog.array_names.insert(p.name.clone()),
            };
        }
        // A name declared as both keeps the stricter array classification.
        catalog.string_names.retain(|n| !catalog.array_names.contains(n));
        catalog
    }
}

impl PipelineSpec {
    pub fn param_catalog(&self) -> ParamCatalog {
        ParamCatalog::from_params(&self.params)
    }

    pub fn task(&self, name: &str) -> Option<&PipelineTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn finally_task(&self, name: &str) -> Option<&PipelineTask> {
        self.finally.iter().find(|t| t.name == name)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse a pipeline from YAML (or JSON). Accepts either a full `Pipeline`
/// resource or a bare spec with `params`/`tasks`/`finally` at the top level.
pub fn parse_pipeline(source: &str) -> whengate_types::Result<Pipeline> {
    let value: serde_yaml::Value = serde_yaml::from_str(source)?;
    if value.get("spec").is_some() {
        return Ok(serde_yaml::from_value(value)?);
    }
    if value.is_null() {
        return Err(WhengateError::Other("pipeline document is empty".into()));
    }
    let spec: PipelineSpec = serde_yaml::from_value(value)?;
    Ok(Pipeline {
        spec,
        ..Pipeline::default()
    })
}

/// Parse a pipeline from strict JSON, with the same resource-or-bare-spec
/// handling as [`parse_pipeline`]. Decoding failures are
/// [`WhengateError::Json`].
pub fn parse_pipeline_json(source: &str) -> whengate_types::Result<Pipeline> {
    let value: serde_json::Value = serde_json::from_str(source)?;
    if value.get("spec").is_some() {
        return Ok(serde_json::from_value(value)?);
    }
    if value.is_null() {
        return Err(WhengateError::Other("pipeline document is empty".into()));
    }
    let spec: PipelineSpec = serde_json::from_value(value)?;
    Ok(Pipeline {
        spec,
        ..Pipeline::default()
    })
}

/// Read and parse a pipeline file. Files with a `.json` extension are
/// decoded as JSON, everything else as YAML.
pub fn load_pipeline(path: &Path) -> whengate_types::Result<Pipeline> {
    let source = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let pipeline = if is_json {
        parse_pipeline_json(&source)?
    } else {
        parse_pipeline(&source)?
    };
    tracing::debug!(path = %path.display(), tasks = pipeline.spec.tasks.len(), "Pipeline loaded");
    Ok(pipeline)
}
