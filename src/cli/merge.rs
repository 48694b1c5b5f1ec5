//! Merge command
//!
//! Merges a remote copy of a project (a token or an exported file) into the
//! local one. Row choices come from flags; `--dry-run` shows the rows that
//! need review and whether the merge would commit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tracing::info;

use super::output::Output;
use super::project::resolve_project;
use super::share::read_remote;
use crate::domain::{
    MergeOutcome, MergeRow, MergeSession, Presence, Priority, RowAction, TaskId,
};
use crate::storage::Workspace;

#[derive(Args)]
pub struct MergeArgs {
    /// Local project id or name (optional when there is only one project)
    pub project: Option<String>,

    /// Remote copy as a token
    #[arg(long, conflicts_with = "file")]
    pub token: Option<String>,

    /// Remote copy as an exported JSON file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Side that wins differing rows: local, remote or newest
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Override a row, e.g. --action 3=keep-remote
    #[arg(long = "action", value_name = "ID=ACTION")]
    pub actions: Vec<String>,

    /// Rename a row's surviving task, e.g. --rename 3="Paint (blue)"
    #[arg(long = "rename", value_name = "ID=NAME")]
    pub renames: Vec<String>,

    /// Keep both versions of a differing row
    #[arg(long = "resurrect", value_name = "ID")]
    pub resurrect: Vec<String>,

    /// Show the rows and the outcome without saving
    #[arg(long)]
    pub dry_run: bool,

    /// Merge even when the copies look like different projects
    #[arg(long)]
    pub force: bool,
}

fn split_pair(raw: &str) -> Result<(TaskId, &str)> {
    let (id, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected ID=VALUE, got '{}'", raw))?;
    Ok((id.trim().parse()?, value))
}

fn presence_label(presence: Presence) -> &'static str {
    match presence {
        Presence::LocalOnly => "local",
        Presence::RemoteOnly => "remote",
        Presence::Both => "both",
    }
}

fn side_label(row: &MergeRow, remote: bool) -> String {
    let task = if remote { &row.remote } else { &row.local };
    match task {
        Some(t) => format!("{} [{}]", t.name, t.status),
        None => "-".to_string(),
    }
}

pub fn run(args: MergeArgs, output: &Output) -> Result<()> {
    let ws = Workspace::open_current()?;
    let local = resolve_project(&ws, args.project.as_deref())?;
    let remote = read_remote(args.token.as_deref(), args.file.as_deref())?;

    if !local.same_project(&remote) && !args.force {
        anyhow::bail!(
            "Remote copy '{}' ({}) does not match project '{}' ({}); pass --force to merge anyway",
            remote.project_name,
            remote.id,
            local.project_name,
            local.id
        );
    }

    let priority = args
        .priority
        .unwrap_or(ws.config().workspace.merge.default_priority);
    let mut session = MergeSession::begin(local, remote, priority);

    for raw in &args.actions {
        let (id, action) = split_pair(raw)?;
        let action: RowAction = action.parse()?;
        session
            .resolve_row(&id, action)
            .with_context(|| format!("Cannot apply --action {}", raw))?;
    }
    for raw in &args.resurrect {
        let id: TaskId = raw.parse()?;
        session
            .resurrect(&id, true)
            .with_context(|| format!("Cannot apply --resurrect {}", raw))?;
    }
    for raw in &args.renames {
        let (id, name) = split_pair(raw)?;
        session
            .rename(&id, name)
            .with_context(|| format!("Cannot apply --rename {}", raw))?;
    }

    if args.dry_run {
        return preview(&session, output);
    }

    match session.commit(Utc::now()).context("Merge was not committed")? {
        MergeOutcome::NothingToMerge => {
            output.success("Nothing to merge: both copies are identical");
        }
        MergeOutcome::Merged(doc) => {
            ws.put_project(&doc)?;
            info!(project = %doc.id, "merged project saved");
            if output.is_json() {
                output.data(&serde_json::json!({
                    "success": true,
                    "project": doc.id,
                    "tasks": doc.live_tasks().count(),
                    "last_synced": doc.last_synced,
                }));
            } else {
                output.success(&format!(
                    "Merged project {} ({} tasks)",
                    doc.id,
                    doc.live_tasks().count()
                ));
            }
        }
    }
    Ok(())
}

fn preview(session: &MergeSession, output: &Output) -> Result<()> {
    let rows: Vec<&MergeRow> = session.view().collect();
    let outcome = session.commit(Utc::now());

    if output.is_json() {
        let (status, error) = match &outcome {
            Ok(MergeOutcome::NothingToMerge) => ("nothing_to_merge", None),
            Ok(MergeOutcome::Merged(_)) => ("ready", None),
            Err(e) => ("blocked", Some(e.to_string())),
        };
        output.data(&serde_json::json!({
            "priority": session.priority(),
            "rows": rows,
            "status": status,
            "error": error,
        }));
        return Ok(());
    }

    if rows.is_empty() {
        println!("No rows need review");
    } else {
        println!(
            "{:<6} {:<7} {:<12} {:<28} REMOTE",
            "ID", "SIDE", "ACTION", "LOCAL"
        );
        println!("{}", "-".repeat(80));
        for row in &rows {
            let mut action = row.action.to_string();
            if row.resurrect {
                action.push('+');
            }
            println!(
                "{:<6} {:<7} {:<12} {:<28} {}",
                row.id.as_str(),
                presence_label(row.presence),
                action,
                side_label(row, false),
                side_label(row, true)
            );
            if let Some(name) = &row.rename {
                println!("{:<6} renamed to '{}'", "", name);
            }
        }
    }

    println!();
    match outcome {
        Ok(MergeOutcome::NothingToMerge) => println!("Nothing to merge"),
        Ok(MergeOutcome::Merged(doc)) => {
            println!("Would merge into {} tasks", doc.live_tasks().count())
        }
        Err(e) => println!("Blocked: {}", e),
    }
    Ok(())
}
