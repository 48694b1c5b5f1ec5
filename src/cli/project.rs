//! Project CLI commands

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;

use super::output::Output;
use crate::domain::{ProjectDocument, Task, TaskId};
use crate::storage::{Workspace, WorkspaceError};

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create an empty project
    New {
        /// Project name
        name: String,

        /// Start date (YYYY-MM-DD), the anchor for day-offset deadlines
        #[arg(long)]
        start: Option<NaiveDate>,
    },

    /// Rename a project
    Rename {
        /// New project name
        name: String,

        /// Project id or name (optional when there is only one project)
        #[arg(long, short = 'p')]
        project: Option<String>,
    },

    /// Set or clear a project's start date
    Start {
        /// Start date (YYYY-MM-DD)
        #[arg(required_unless_present = "clear")]
        date: Option<NaiveDate>,

        /// Remove the start date
        #[arg(long, conflicts_with = "date")]
        clear: bool,

        /// Project id or name (optional when there is only one project)
        #[arg(long, short = 'p')]
        project: Option<String>,
    },

    /// Delete a project and all of its tasks
    Delete {
        /// Project id or name
        project: String,
    },

    /// List projects
    List,

    /// Show a project's task tree
    Show {
        /// Project id or name (optional when there is only one project)
        project: Option<String>,

        /// Include deleted tasks
        #[arg(long)]
        all: bool,
    },
}

pub fn run(cmd: ProjectCommands, output: &Output) -> Result<()> {
    match cmd {
        ProjectCommands::New { name, start } => new_project(output, &name, start),
        ProjectCommands::Rename { name, project } => {
            rename_project(output, project.as_deref(), &name)
        }
        ProjectCommands::Start {
            date,
            clear,
            project,
        } => set_start(output, project.as_deref(), if clear { None } else { date }),
        ProjectCommands::Delete { project } => delete_project(output, &project),
        ProjectCommands::List => list_projects(output),
        ProjectCommands::Show { project, all } => show_project(output, project.as_deref(), all),
    }
}

/// Picks the project named by `query`, or the only project when omitted
pub(super) fn resolve_project(ws: &Workspace, query: Option<&str>) -> Result<ProjectDocument> {
    match query {
        Some(q) => ws.find_project(q),
        None => {
            let mut projects = ws.load_projects()?;
            match projects.len() {
                1 => Ok(projects.remove(0)),
                0 => Err(WorkspaceError::ProjectNotFound("(none created yet)".to_string()).into()),
                n => anyhow::bail!("{} projects exist; pass a project id or name", n),
            }
        }
    }
}

fn new_project(output: &Output, name: &str, start: Option<NaiveDate>) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = ws
        .create_project(name, start)
        .with_context(|| format!("Failed to create project '{}'", name))?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": doc.id,
            "name": doc.project_name,
            "start_date": doc.start_date,
        }));
    } else {
        output.success(&format!("Created project {} ({})", doc.id, doc.project_name));
    }
    Ok(())
}

fn rename_project(output: &Output, query: Option<&str>, name: &str) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, query)?;
    let taken = ws
        .load_projects()?
        .iter()
        .any(|p| p.id != doc.id && p.project_name == name.trim());
    if taken {
        return Err(WorkspaceError::DuplicateProject(name.trim().to_string()).into());
    }

    let mut editor = ws.editor(doc);
    editor.rename_project(name)?;
    ws.put_project(editor.document())?;

    let doc = editor.document();
    output.success(&format!("Renamed project {} to '{}'", doc.id, doc.project_name));
    Ok(())
}

fn set_start(output: &Output, query: Option<&str>, start: Option<NaiveDate>) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, query)?;

    let mut editor = ws.editor(doc);
    editor.set_start_date(start);
    ws.put_project(editor.document())?;

    let id = &editor.document().id;
    match start {
        Some(date) => output.success(&format!("Project {} starts on {}", id, date)),
        None => output.success(&format!("Cleared start date of project {}", id)),
    }
    Ok(())
}

fn delete_project(output: &Output, query: &str) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = ws.delete_project(query)?;
    output.success(&format!("Deleted project {} ({})", doc.id, doc.project_name));
    Ok(())
}

fn list_projects(output: &Output) -> Result<()> {
    let ws = Workspace::open_current()?;
    let projects = ws.load_projects()?;

    if output.is_json() {
        let items: Vec<_> = projects
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "name": p.project_name,
                    "tasks": p.live_tasks().count(),
                    "last_synced": p.last_synced,
                })
            })
            .collect();
        output.data(&items);
    } else if projects.is_empty() {
        println!("No projects");
    } else {
        println!("{:<8} {:<6} NAME", "ID", "TASKS");
        println!("{}", "-".repeat(40));
        for p in &projects {
            println!("{:<8} {:<6} {}", p.id.as_str(), p.live_tasks().count(), p.project_name);
        }
    }
    Ok(())
}

fn show_project(output: &Output, query: Option<&str>, include_deleted: bool) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, query)?;

    if output.is_json() {
        output.data(&doc);
        return Ok(());
    }

    println!("Project: {} ({})", doc.project_name, doc.id);
    if let Some(start) = doc.start_date {
        println!("Start: {}", start);
    }
    if let Some(synced) = doc.last_synced {
        println!("Last synced: {}", synced.format("%Y-%m-%d %H:%M"));
    }
    println!();

    for line in render_tree(&doc) {
        println!("{}", line);
    }

    if include_deleted {
        let deleted: Vec<&Task> = doc.tasks.iter().filter(|t| t.is_deleted).collect();
        if !deleted.is_empty() {
            println!("\nDeleted:");
            for task in deleted {
                println!("  {} {}", task.id, task.name);
            }
        }
    }
    Ok(())
}

/// Indented lines for the live forest, siblings in `order`
pub(super) fn render_tree(doc: &ProjectDocument) -> Vec<String> {
    let mut children: HashMap<Option<&TaskId>, Vec<&Task>> = HashMap::new();
    for task in doc.live_tasks() {
        children.entry(task.parent_id.as_ref()).or_default().push(task);
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    }

    let mut lines = Vec::new();
    if children.is_empty() {
        lines.push("No tasks".to_string());
        return lines;
    }

    let mut stack: Vec<(&Task, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|t| (*t, 0)).collect())
        .unwrap_or_default();
    while let Some((task, depth)) = stack.pop() {
        let mut line = format!(
            "{}{:<4} [{}] {}",
            "  ".repeat(depth),
            task.id.as_str(),
            task.status,
            task.name
        );
        if let Some(deadline) = task.deadline.and_then(|d| d.resolve(doc.start_date)) {
            line.push_str(&format!("  (due {})", deadline.format("%Y-%m-%d")));
        }
        lines.push(line);

        if let Some(kids) = children.get(&Some(&task.id)) {
            stack.extend(kids.iter().rev().map(|t| (*t, depth + 1)));
        }
    }
    lines
}
