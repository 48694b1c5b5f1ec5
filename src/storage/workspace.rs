//! Workspace management
//!
//! Handles workspace initialization and provides access to the stores.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use super::config::WORKSPACE_DIR;
use super::{Config, DocumentStore, FileSequence};
use crate::domain::{Editor, ProjectDocument, ProjectIdAllocator};

/// Storage key holding every project of the workspace
pub const PROJECTS_KEY: &str = "projects";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not in a taskforest workspace. Run 'taskforest init' first.")]
    NotInWorkspace,

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project name '{0}' matches more than one project; use its id")]
    AmbiguousProject(String),

    #[error("A project named '{0}' already exists")]
    DuplicateProject(String),
}

/// A taskforest workspace
pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    /// Opens an existing workspace at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join(WORKSPACE_DIR).is_dir() {
            return Err(WorkspaceError::NotInWorkspace.into());
        }

        let config = Config::for_workspace(&root)?;
        Ok(Self { root, config })
    }

    /// Opens the workspace at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_workspace_root().ok_or(WorkspaceError::NotInWorkspace)?;
        Self::open(root)
    }

    /// Initializes a workspace at the given path; existing files are kept
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);

        for sub in ["documents", "sequences"] {
            let path = dir.join(sub);
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }

        let config_path = dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# taskforest workspace configuration

[merge]
# Side that wins differing rows: "local", "remote" or "newest"
default_priority = "local"

[history]
# Undo snapshots kept per editing session
limit = 50
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, "# Interrupted atomic writes\n*.tmp\n").with_context(
                || format!("Failed to write .gitignore: {}", gitignore_path.display()),
            )?;
        }

        info!(root = %root.display(), "workspace initialized");
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .taskforest directory path
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document_store(&self) -> DocumentStore {
        DocumentStore::new(self.workspace_dir().join("documents"))
    }

    pub fn sequence(&self) -> FileSequence {
        FileSequence::new(self.workspace_dir().join("sequences"))
    }

    /// Loads every project; an untouched workspace has none
    pub fn load_projects(&self) -> Result<Vec<ProjectDocument>> {
        Ok(self.document_store().load(PROJECTS_KEY)?.unwrap_or_default())
    }

    pub fn save_projects(&self, projects: &[ProjectDocument]) -> Result<()> {
        self.document_store().save(PROJECTS_KEY, projects)
    }

    /// Creates an empty project with a freshly allocated id
    pub fn create_project(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<ProjectDocument> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Project names must not be empty");
        }

        let mut projects = self.load_projects()?;
        if projects.iter().any(|p| p.project_name == name) {
            return Err(WorkspaceError::DuplicateProject(name.to_string()).into());
        }

        // Imported projects may already hold ids the counter has not reached.
        let allocator = ProjectIdAllocator::new(self.sequence());
        let mut id = allocator.next_id().context("Failed to allocate project id")?;
        for _ in 0..projects.len() {
            if !projects.iter().any(|p| p.id == id) {
                break;
            }
            id = allocator.next_id().context("Failed to allocate project id")?;
        }
        if projects.iter().any(|p| p.id == id) {
            anyhow::bail!("Could not allocate a free project id");
        }

        let mut doc = ProjectDocument::new(id, name);
        doc.start_date = start_date;
        projects.push(doc.clone());
        self.save_projects(&projects)?;

        info!(project = %doc.id, name, "project created");
        Ok(doc)
    }

    /// Looks a project up by id, then by exact name
    pub fn find_project(&self, query: &str) -> Result<ProjectDocument> {
        let projects = self.load_projects()?;
        let idx = find_project_index(&projects, query)?;
        Ok(projects[idx].clone())
    }

    /// Replaces the stored project with the same id, or adds it
    pub fn put_project(&self, doc: &ProjectDocument) -> Result<()> {
        let mut projects = self.load_projects()?;
        match projects.iter_mut().find(|p| p.id == doc.id) {
            Some(slot) => *slot = doc.clone(),
            None => projects.push(doc.clone()),
        }
        self.save_projects(&projects)
    }

    /// Deletes a project; the document file goes with the last one
    pub fn delete_project(&self, query: &str) -> Result<ProjectDocument> {
        let mut projects = self.load_projects()?;
        let idx = find_project_index(&projects, query)?;
        let doc = projects.remove(idx);

        if projects.is_empty() {
            self.document_store().remove(PROJECTS_KEY)?;
        } else {
            self.save_projects(&projects)?;
        }

        info!(project = %doc.id, "project deleted");
        Ok(doc)
    }

    /// Opens an editor on a project with the configured history bound
    pub fn editor(&self, doc: ProjectDocument) -> Editor {
        Editor::with_history_limit(doc, self.config.workspace.history.limit)
    }
}

/// Index of the project matching `query` by id, then by name
pub fn find_project_index(projects: &[ProjectDocument], query: &str) -> Result<usize, WorkspaceError> {
    if let Some(idx) = projects.iter().position(|p| p.id.as_str() == query) {
        return Ok(idx);
    }

    let mut by_name = projects
        .iter()
        .enumerate()
        .filter(|(_, p)| p.project_name == query)
        .map(|(i, _)| i);
    match (by_name.next(), by_name.next()) {
        (Some(idx), None) => Ok(idx),
        (Some(_), Some(_)) => Err(WorkspaceError::AmbiguousProject(query.to_string())),
        _ => Err(WorkspaceError::ProjectNotFound(query.to_string())),
    }
}
