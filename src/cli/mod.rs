//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Workspace setup | `init` |
//! | Project | Project lifecycle | `project new`, `project rename`, `project start`, `project delete`, `project list`, `project show` |
//! | Task | Forest editing | `task add`, `task status`, `task move`, `task delete` |
//! | Sharing | Tokens and files | `token export`, `token import`, `export`, `import` |
//! | Merge | Reconcile two copies | `merge --token ...`, `merge --file ... --dry-run` |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) to log pipeline decisions to stderr:
//! ```bash
//! taskforest --verbose merge --token "$TOKEN" --dry-run
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod merge;
mod output;
mod project;
mod share;
mod task;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
