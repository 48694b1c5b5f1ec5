//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::output::{Output, OutputFormat};
use super::{merge, project, share, task};
use crate::storage::{Config, Workspace};

#[derive(Parser)]
#[command(name = "taskforest")]
#[command(author, version, about = "Hierarchical task lists that travel as a single token")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Log pipeline decisions to stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a taskforest workspace
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Manage projects
    #[command(subcommand)]
    Project(project::ProjectCommands),

    /// Manage tasks of a project
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Share a project as a URL-safe token
    #[command(subcommand)]
    Token(share::TokenCommands),

    /// Write a project's canonical JSON to a file or stdout
    Export {
        /// Project id or name
        project: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Add a project from a canonical JSON file
    Import {
        /// File written by `export`
        file: PathBuf,
    },

    /// Merge another copy of a project into the local one
    Merge(merge::MergeArgs),
}

/// Installs the stderr tracing subscriber
///
/// `RUST_LOG` wins; otherwise `--verbose` enables debug events for this
/// crate and everything else stays off.
fn init_tracing(verbose: bool) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| {
            if verbose {
                EnvFilter::new("taskforest=debug")
            } else {
                EnvFilter::new("off")
            }
        });

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load()?.global.default_format.into(),
    };
    let output = Output::new(format);

    match cli.command {
        Commands::Init { path } => {
            debug!(path = %path.display(), "initializing workspace");
            let ws = Workspace::init(&path)?;
            output.success(&format!(
                "Initialized taskforest workspace at {}",
                ws.root().display()
            ));
        }

        Commands::Project(cmd) => project::run(cmd, &output)?,
        Commands::Task(cmd) => task::run(cmd, &output)?,
        Commands::Token(cmd) => share::run_token(cmd, &output)?,
        Commands::Export { project, output: path } => {
            share::export(&output, project.as_deref(), path.as_deref())?
        }
        Commands::Import { file } => share::import(&output, &file)?,
        Commands::Merge(args) => merge::run(args, &output)?,
    }

    debug!("command completed");
    Ok(())
}
