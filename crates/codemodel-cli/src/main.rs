//! Code model CLI.
//!
//! Provides the `codemodel` binary for inspecting declarations loaded from a
//! JSON declarations file: render a declaration as source text, render an
//! editable copy of it, or merge its counterpart into such a copy.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use codemodel_core::{CodeModel, MergeStrategy, ModelError};
use codemodel_source::{JsonSource, SourceError};

/// Code model inspection tools.
#[derive(Parser)]
#[command(name = "codemodel", about = "Render, copy and merge code model declarations")]
struct Cli {
    /// Path to the JSON declarations file.
    #[arg(short, long, env = "CODEMODEL_DECLS")]
    decls: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List the qualified names the declarations file provides.
    List,

    /// Render a declaration as source text.
    Render {
        /// Qualified name, e.g. `com.example.Widget`.
        name: String,
    },

    /// Render an editable copy of a declaration.
    Copy {
        name: String,

        /// Rename the copy before rendering.
        #[arg(long)]
        rename: Option<String>,
    },

    /// Merge a counterpart into an editable copy and render the result.
    Merge {
        name: String,

        /// keep, override, merge or merge-override-body.
        #[arg(short, long, default_value = "merge")]
        strategy: MergeStrategy,

        /// Merge this declaration instead of the file's counterpart.
        #[arg(long)]
        with: Option<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("no counterpart for '{0}'")]
    NoCounterpart(String),
}

impl CliError {
    /// Exit code: 1 = model error, 3 = I/O or parse error.
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Source(_) => 3,
            CliError::Model(_) | CliError::NoCounterpart(_) => 1,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => print!("{output}"),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(err.exit_code());
        }
    }
}

fn run(cli: &Cli) -> Result<String, CliError> {
    let source = JsonSource::from_path(&cli.decls)?;
    info!(path = %cli.decls.display(), "declarations loaded");
    match &cli.command {
        Commands::List => Ok(source.names().map(|n| format!("{n}\n")).collect()),
        Commands::Render { name } => {
            let mut model = CodeModel::with_source(source);
            let id = model.lookup_required(name)?;
            Ok(model.render_to_string(id)?)
        }
        Commands::Copy { name, rename } => {
            let mut model = CodeModel::with_source(source);
            run_copy(&mut model, name, rename.as_deref())
        }
        Commands::Merge {
            name,
            strategy,
            with,
        } => {
            let mut model = CodeModel::with_source(source);
            run_merge(&mut model, name, *strategy, with.as_deref())
        }
    }
}

fn run_copy(model: &mut CodeModel, name: &str, rename: Option<&str>) -> Result<String, CliError> {
    let original = model.lookup_required(name)?;
    let copy = model.copy(original)?;
    if let Some(new_name) = rename {
        model.set_name(copy, new_name)?;
    }
    Ok(model.render_to_string(copy)?)
}

fn run_merge(
    model: &mut CodeModel,
    name: &str,
    strategy: MergeStrategy,
    with: Option<&str>,
) -> Result<String, CliError> {
    let original = model.lookup_required(name)?;
    let editable = model.copy(original)?;
    model.bind(name, editable)?;
    match with {
        Some(other) => {
            let incoming = model.lookup_required(other)?;
            model.merge(editable, incoming, strategy)?;
        }
        None => {
            if !model.merge_counterpart(editable, strategy)? {
                return Err(CliError::NoCounterpart(name.to_string()));
            }
        }
    }
    info!(%name, %strategy, "merged");
    Ok(model.render_to_string(editable)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECLS: &str = r#"{
        "declarations": [
            { "kind": "type", "package": "demo", "name": "Clock",
              "children": [
                { "kind": "method", "name": "tick", "type_name": "void" }
              ] }
        ],
        "counterparts": [
            { "kind": "type", "package": "demo", "name": "Clock",
              "children": [
                { "kind": "method", "name": "tick", "type_name": "void",
                  "children": [ { "kind": "expression", "value": "now++;" } ] }
              ] }
        ]
    }"#;

    fn model() -> CodeModel {
        CodeModel::with_source(JsonSource::from_str(DECLS).unwrap())
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn copy_can_rename() {
        let mut model = model();
        let text = run_copy(&mut model, "demo.Clock", Some("Watch")).unwrap();
        assert_eq!(text, "class Watch {\n    void tick();\n}\n");
    }

    #[test]
    fn merge_pulls_counterpart_body() {
        let mut model = model();
        let text = run_merge(&mut model, "demo.Clock", MergeStrategy::MergeOverrideBody, None).unwrap();
        assert_eq!(text, "class Clock {\n    void tick() {\n        now++;\n    }\n}\n");
    }

    #[test]
    fn unknown_name_is_a_model_error() {
        let mut model = model();
        let err = run_copy(&mut model, "demo.Missing", None).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
