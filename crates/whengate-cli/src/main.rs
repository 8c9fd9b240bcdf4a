//! CLI binary for validating pipeline when expressions.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use whengate_pipeline::{
    extract_variables, load_pipeline, result_dependencies, validate_pipeline, Pipeline,
    PARAMS_PREFIX,
};
use whengate_types::{FieldError, WhengateError};

#[derive(Parser)]
#[command(name = "whengate", version, about = "Static validation for pipeline when expressions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the when expressions of a pipeline file (YAML or JSON)
    Validate {
        /// Path to the pipeline file
        pipeline: PathBuf,

        /// Output format for the validation report
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List each task's reference, ordering, guards, and the references they carry
    Inspect {
        /// Path to the pipeline file
        pipeline: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    pipeline: Option<&'a str>,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a FieldError>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing: RUST_LOG wins over the --verbose default
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { pipeline, format } => {
            cmd_validate(&pipeline, format)?;
        }
        Commands::Inspect { pipeline } => {
            cmd_inspect(&pipeline)?;
        }
    }

    Ok(())
}

fn cmd_validate(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    tracing::debug!(path = %path.display(), "Validating pipeline");
    let pipeline = load_pipeline(path)?;
    let outcome = validate_pipeline(&pipeline.spec);

    let (task, error) = match &outcome {
        Ok(()) => (None, None),
        Err(WhengateError::Task { task, source }) => (Some(task.as_str()), Some(source)),
        Err(WhengateError::Field(source)) => (None, Some(source)),
        Err(other) => anyhow::bail!("{other}"),
    };

    match format {
        OutputFormat::Json => {
            let report = Report {
                pipeline: pipeline.metadata.name.as_deref(),
                valid: error.is_none(),
                task,
                error,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => match (task, error) {
            (_, None) => println!("Pipeline is valid"),
            (Some(task), Some(err)) => println!("[ERROR] task '{task}': {err}"),
            (None, Some(err)) => println!("[ERROR] {err}"),
        },
    }

    if error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_inspect(path: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(path)?;
    write_summary(&mut std::io::stdout().lock(), &pipeline)?;
    Ok(())
}

fn write_summary(out: &mut impl Write, pipeline: &Pipeline) -> std::io::Result<()> {
    let spec = &pipeline.spec;
    writeln!(
        out,
        "Pipeline: {}",
        pipeline.metadata.name.as_deref().unwrap_or("(unnamed)")
    )?;

    let catalog = spec.param_catalog();
    let mut strings: Vec<_> = catalog.string_names.iter().map(String::as_str).collect();
    let mut arrays: Vec<_> = catalog.array_names.iter().map(String::as_str).collect();
    strings.sort_unstable();
    arrays.sort_unstable();
    writeln!(out, "Params: string=[{}] array=[{}]", strings.join(", "), arrays.join(", "))?;

    let sections = [("Tasks", &spec.tasks), ("Finally", &spec.finally)];
    for (title, tasks) in sections {
        if tasks.is_empty() {
            continue;
        }
        writeln!(out, "\n{title}:")?;
        for task in tasks {
            writeln!(out, "  {} ({} guard(s))", task.name, task.when.len())?;
            if let Some(task_ref) = &task.task_ref {
                match &task_ref.kind {
                    Some(kind) => writeln!(out, "    taskRef: {} ({kind})", task_ref.name)?,
                    None => writeln!(out, "    taskRef: {}", task_ref.name)?,
                }
            }
            if !task.run_after.is_empty() {
                writeln!(out, "    runAfter: {}", task.run_after.join(", "))?;
            }
            for we in &task.when {
                writeln!(
                    out,
                    "    {} {} [{}]",
                    display_operand(&we.input),
                    we.operator,
                    we.values.join(", ")
                )?;
                let params: Vec<&str> = std::iter::once(we.input.as_str())
                    .chain(we.values.iter().map(String::as_str))
                    .flat_map(|v| extract_variables(v, PARAMS_PREFIX))
                    .collect();
                if !params.is_empty() {
                    writeln!(out, "      params: {}", params.join(", "))?;
                }
            }
        }
    }

    let deps = result_dependencies(spec);
    if !deps.is_empty() {
        writeln!(out, "\nResult dependencies:")?;
        for (task, from) in deps {
            writeln!(out, "  {task} <- {}", from.join(", "))?;
        }
    }
    Ok(())
}

fn display_operand(s: &str) -> &str {
    if s.is_empty() {
        "\"\""
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whengate_pipeline::parse_pipeline;

    fn summary(yaml: &str) -> String {
        let pipeline = parse_pipeline(yaml).unwrap();
        let mut out = Vec::new();
        write_summary(&mut out, &pipeline).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn summary_lists_task_refs_and_ordering() {
        let text = summary(
            r#"
metadata:
  name: ship
spec:
  params:
    - name: branch
  tasks:
    - name: build
      taskRef:
        name: buildah
    - name: deploy
      runAfter: [build]
      taskRef:
        name: kubectl
        kind: ClusterTask
      when:
        - input: $(params.branch)
          operator: in
          values: [main]
        - input: $(tasks.build.results.digest)
          operator: notin
          values: [""]
"#,
        );
        assert!(text.starts_with("Pipeline: ship\n"));
        assert!(text.contains("Params: string=[branch] array=[]"));
        assert!(text.contains("    taskRef: buildah\n"));
        assert!(text.contains("    taskRef: kubectl (ClusterTask)\n"));
        assert!(text.contains("    runAfter: build\n"));
        assert!(text.contains("      params: branch\n"));
        assert!(text.contains("  deploy <- build\n"));
    }

    #[test]
    fn summary_of_unnamed_bare_spec() {
        let text = summary("tasks:\n  - name: a\n");
        assert!(text.starts_with("Pipeline: (unnamed)\n"));
        assert!(!text.contains("runAfter"));
        assert!(!text.contains("Result dependencies"));
    }
}
