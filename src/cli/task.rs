//! Task CLI commands
//!
//! Every command loads the project, applies one edit through [`Editor`] and
//! stores the result, so a rejected edit never reaches disk.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};

use super::output::Output;
use super::project::{render_tree, resolve_project};
use crate::domain::{Deadline, Editor, MoveTarget, TaskId, TaskStatus};
use crate::storage::Workspace;

/// Project selector shared by every task command
#[derive(Args)]
pub struct ProjectArg {
    /// Project id or name (optional when there is only one project)
    #[arg(long, short = 'p')]
    pub project: Option<String>,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    ///
    /// Examples:
    ///   taskforest task add "Buy paint"
    ///   taskforest task add "Pick colour" --parent 0
    Add {
        /// Task name
        name: String,

        /// Parent task id
        #[arg(long)]
        parent: Option<String>,

        #[command(flatten)]
        project: ProjectArg,
    },

    /// Rename a task
    Rename {
        id: String,
        name: String,

        #[command(flatten)]
        project: ProjectArg,
    },

    /// Set a task's status; on a parent the status cascades to its subtasks
    Status {
        id: String,

        /// not-started, in-progress, done or suspended
        status: TaskStatus,

        #[command(flatten)]
        project: ProjectArg,
    },

    /// Set or clear a deadline
    Deadline {
        id: String,

        /// Days after the project start, a date (YYYY-MM-DD) or an RFC 3339 time
        #[arg(required_unless_present = "clear")]
        when: Option<String>,

        /// Remove the deadline
        #[arg(long)]
        clear: bool,

        #[command(flatten)]
        project: ProjectArg,
    },

    /// Move a task under another parent or to the root level
    Move {
        id: String,

        /// New parent task id
        #[arg(long, conflicts_with = "root")]
        parent: Option<String>,

        /// Move to the root level
        #[arg(long)]
        root: bool,

        /// Position among the new siblings, 0-based (defaults to last)
        #[arg(long)]
        index: Option<usize>,

        #[command(flatten)]
        project: ProjectArg,
    },

    /// Delete a task and its subtasks
    Delete {
        id: String,

        #[command(flatten)]
        project: ProjectArg,
    },

    /// List a project's tasks
    List {
        #[command(flatten)]
        project: ProjectArg,
    },
}

pub fn run(cmd: TaskCommands, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            name,
            parent,
            project,
        } => add_task(output, project.project.as_deref(), &name, parent.as_deref()),
        TaskCommands::Rename { id, name, project } => {
            edit(output, project.project.as_deref(), |ed, now| {
                let id: TaskId = id.parse()?;
                ed.rename(&id, &name, now)?;
                Ok(format!("Renamed task {} to '{}'", id, name.trim()))
            })
        }
        TaskCommands::Status {
            id,
            status,
            project,
        } => edit(output, project.project.as_deref(), |ed, now| {
            let id: TaskId = id.parse()?;
            let has_children = ed.document().live_tasks().any(|t| t.parent_id.as_ref() == Some(&id));
            if has_children {
                ed.set_parent_status(&id, status, now)?;
            } else {
                ed.set_status(&id, status, now)?;
            }
            Ok(format!("Set task {} to {}", id, status))
        }),
        TaskCommands::Deadline {
            id,
            when,
            clear,
            project,
        } => edit(output, project.project.as_deref(), |ed, now| {
            let id: TaskId = id.parse()?;
            let deadline = match (clear, when) {
                (true, _) | (false, None) => None,
                (false, Some(raw)) => Some(parse_deadline(&raw)?),
            };
            ed.set_deadline(&id, deadline, now)?;
            Ok(match deadline {
                Some(_) => format!("Set deadline of task {}", id),
                None => format!("Cleared deadline of task {}", id),
            })
        }),
        TaskCommands::Move {
            id,
            parent,
            root,
            index,
            project,
        } => edit(output, project.project.as_deref(), |ed, now| {
            let id: TaskId = id.parse()?;
            let current_parent = ed
                .document()
                .task(&id)
                .and_then(|t| t.parent_id.clone());
            let new_parent = match (parent, root) {
                (Some(p), _) => Some(p.parse::<TaskId>()?),
                (None, true) => None,
                (None, false) => current_parent,
            };
            let target = MoveTarget {
                parent: new_parent,
                index: index.unwrap_or(usize::MAX),
            };
            ed.move_task(&id, &target, now)?;
            Ok(format!("Moved task {}", id))
        }),
        TaskCommands::Delete { id, project } => {
            edit(output, project.project.as_deref(), |ed, now| {
                let id: TaskId = id.parse()?;
                let count = ed.delete_subtree(&id, now)?;
                Ok(format!("Deleted {} task(s)", count))
            })
        }
        TaskCommands::List { project } => list_tasks(output, project.project.as_deref()),
    }
}

/// Reads a deadline argument
fn parse_deadline(raw: &str) -> Result<Deadline> {
    let raw = raw.trim();
    if let Ok(days) = raw.parse::<i64>() {
        return Ok(Deadline::DayOffset(days));
    }
    if let Ok(date) = raw.parse::<NaiveDate>() {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .context("Invalid date")?
            .and_utc();
        return Ok(Deadline::At(midnight));
    }
    let at: DateTime<Utc> = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid deadline: '{}'", raw))?
        .with_timezone(&Utc);
    Ok(Deadline::At(at))
}

/// Runs one edit against the selected project and stores the result
fn edit<F>(output: &Output, project: Option<&str>, apply: F) -> Result<()>
where
    F: FnOnce(&mut Editor, DateTime<Utc>) -> Result<String>,
{
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, project)?;
    let mut editor = ws.editor(doc);

    let message = apply(&mut editor, Utc::now())?;
    ws.put_project(editor.document())?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "success": true,
            "message": message,
            "project": editor.document().id,
        }));
    } else {
        output.success(&message);
    }
    Ok(())
}

fn add_task(output: &Output, project: Option<&str>, name: &str, parent: Option<&str>) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, project)?;
    let mut editor = ws.editor(doc);

    let parent: Option<TaskId> = parent.map(|p| p.parse::<TaskId>()).transpose()?;
    let id = editor.add_task(name, parent.as_ref(), Utc::now())?;
    ws.put_project(editor.document())?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id,
            "name": name.trim(),
            "parent": parent,
        }));
    } else {
        output.success(&format!("Added task {}: {}", id, name.trim()));
    }
    Ok(())
}

fn list_tasks(output: &Output, project: Option<&str>) -> Result<()> {
    let ws = Workspace::open_current()?;
    let doc = resolve_project(&ws, project)?;

    if output.is_json() {
        let items: Vec<_> = doc.live_tasks().collect();
        output.data(&items);
    } else {
        for line in render_tree(&doc) {
            println!("{}", line);
        }
    }
    Ok(())
}
