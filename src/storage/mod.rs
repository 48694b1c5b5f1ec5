//! # Storage Layer
//!
//! File-backed storage collaborator for taskforest.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Projects | JSONL, one canonical document per line | `.taskforest/documents/projects.jsonl` |
//! | Sequence counters | decimal text | `.taskforest/sequences/{name}.seq` |
//! | Config | TOML | `.taskforest/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`DocumentStore`] and [`FileSequence`] use file locking (`fs2`)
//! - Document writes are atomic (temp file + rename)
//!
//! ## Workspace Structure
//!
//! ```text
//! .taskforest/
//! ├── documents/
//! │   └── projects.jsonl
//! ├── sequences/
//! │   └── projects.seq
//! ├── config.toml
//! └── .gitignore
//! ```

mod config;
mod jsonl;
mod sequence;
mod workspace;

pub use config::{
    Config, ConfigError, GlobalConfig, HistoryConfig, MergeConfig, OutputFormat, WorkspaceConfig,
    WORKSPACE_DIR,
};
pub use jsonl::DocumentStore;
pub use sequence::FileSequence;
pub use workspace::{find_project_index, Workspace, WorkspaceError, PROJECTS_KEY};
