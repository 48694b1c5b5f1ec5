//! Sharing commands: tokens and canonical JSON files

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::debug;

use super::output::Output;
use super::project::resolve_project;
use crate::codec::{self, MappingRegistry};
use crate::domain::{validate, ProjectDocument};
use crate::storage::Workspace;

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Print a project's URL-safe token
    Export {
        /// Project id or name (optional when there is only one project)
        project: Option<String>,
    },

    /// Add the project carried by a token
    Import {
        /// Token printed by `token export`
        token: String,
    },
}

pub fn run_token(cmd: TokenCommands, output: &Output) -> Result<()> {
    match cmd {
        TokenCommands::Export { project } => export_token(output, project.as_deref()),
        TokenCommands::Import { token } => import_token(output, &token),
    }
}

fn export_token(output: &Output, project: Option<&str>) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, project)?;
    let token = codec::encode(&doc, MappingRegistry::builtin())
        .with_context(|| format!("Failed to encode project {}", doc.id))?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "project": doc.id,
            "token": token,
        }));
    } else {
        println!("{}", token);
    }
    Ok(())
}

fn import_token(output: &Output, token: &str) -> Result<()> {
    let doc = codec::decode(token, MappingRegistry::builtin()).context("Failed to decode token")?;
    add_project(output, doc)
}

/// Writes canonical JSON for a project
pub fn export(output: &Output, project: Option<&str>, path: Option<&Path>) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, project)?;
    let text = codec::to_canonical(&doc)?;

    match path {
        Some(path) => {
            fs::write(path, format!("{}\n", text))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output.success(&format!("Exported project {} to {}", doc.id, path.display()));
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Reads a canonical JSON file and adds its project
pub fn import(output: &Output, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = codec::from_canonical(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    add_project(output, doc)
}

/// Reads a merge source: a token, or a canonical JSON file
pub(super) fn read_remote(token: Option<&str>, file: Option<&Path>) -> Result<ProjectDocument> {
    let doc = match (token, file) {
        (Some(token), _) => {
            codec::decode(token, MappingRegistry::builtin()).context("Failed to decode token")
        }
        (None, Some(path)) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            codec::from_canonical(&text).with_context(|| format!("Failed to parse {}", path.display()))
        }
        (None, None) => anyhow::bail!("Pass --token or --file"),
    }?;
    validate(&doc.tasks).context("Remote copy is not a valid task forest")?;
    Ok(doc)
}

fn add_project(output: &Output, doc: ProjectDocument) -> Result<()> {
    validate(&doc.tasks).context("Imported project is not a valid task forest")?;

    let ws = Workspace::open_current()?;
    let projects = ws.load_projects()?;
    if let Some(existing) = projects.iter().find(|p| p.same_project(&doc)) {
        anyhow::bail!(
            "Project {} ({}) already exists; use 'taskforest merge {}' to combine the copies",
            existing.id,
            existing.project_name,
            existing.id
        );
    }

    debug!(project = %doc.id, tasks = doc.tasks.len(), "importing project");
    ws.put_project(&doc)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": doc.id,
            "name": doc.project_name,
            "tasks": doc.live_tasks().count(),
        }));
    } else {
        output.success(&format!("Imported project {} ({})", doc.id, doc.project_name));
    }
    Ok(())
}
