//! Configuration handling for taskforest
//!
//! Configuration is stored in `.taskforest/config.toml` (workspace) and
//! the platform config dir, e.g. `~/.config/taskforest/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{History, Priority, ProjectDocument};

/// Name of the workspace directory
pub const WORKSPACE_DIR: &str = ".taskforest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Merge defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    /// Priority used when `--priority` is not given
    pub default_priority: Priority,
}

/// Undo history settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Snapshots kept per editing session
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: History::<ProjectDocument>::DEFAULT_LIMIT,
        }
    }
}

/// Workspace-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub merge: MergeConfig,

    pub history: HistoryConfig,
}

impl WorkspaceConfig {
    /// Rejects values that parse but make no sense
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.history.limit > 10_000 {
            return Err(ConfigError::Invalid(format!(
                "history.limit {} is too large (max 10000)",
                self.history.limit
            )));
        }
        Ok(())
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + workspace)
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub global: GlobalConfig,
    pub root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        match Self::find_workspace_root() {
            Some(root) => Ok(Self {
                workspace: Self::load_workspace_config(&root)?,
                global,
                root: Some(root),
            }),
            None => Ok(Self {
                workspace: WorkspaceConfig::default(),
                global,
                root: None,
            }),
        }
    }

    /// Loads configuration for a specific workspace
    pub fn for_workspace(root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let workspace = Self::load_workspace_config(root)?;

        Ok(Self {
            workspace,
            global,
            root: Some(root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "taskforest", "taskforest")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    fn load_workspace_config(root: &Path) -> Result<WorkspaceConfig> {
        let config_path = root.join(WORKSPACE_DIR).join("config.toml");

        if !config_path.exists() {
            return Ok(WorkspaceConfig::default());
        }

        let content = fs::read_to_string(&config_path).with_context(|| {
            format!("Failed to read workspace config: {}", config_path.display())
        })?;

        let config: WorkspaceConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse workspace config")?;
        config.check().context("Invalid workspace config")?;
        Ok(config)
    }

    /// Finds the workspace root by looking for a `.taskforest/` directory
    pub fn find_workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_workspace_root_from(&current)
    }

    /// Walks up from `start` looking for a `.taskforest/` directory
    pub fn find_workspace_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config {
            workspace: WorkspaceConfig::default(),
            global: GlobalConfig::default(),
            root: None,
        };

        assert_eq!(config.workspace.merge.default_priority, Priority::Local);
        assert_eq!(config.workspace.history.limit, 50);
        assert_eq!(config.global.default_format, OutputFormat::Text);
    }

    #[test]
    fn parse_workspace_config() {
        let toml = r#"
[merge]
default_priority = "newest"

[history]
limit = 5
"#;

        let config: WorkspaceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.merge.default_priority, Priority::Newest);
        assert_eq!(config.history.limit, 5);
    }

    #[test]
    fn partial_workspace_config_uses_defaults() {
        let config: WorkspaceConfig = toml::from_str("[history]\nlimit = 3\n").unwrap();
        assert_eq!(config.merge.default_priority, Priority::Local);
    }

    #[test]
    fn parse_global_config() {
        let config: GlobalConfig = toml::from_str("default_format = \"json\"\n").unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
    }

    #[test]
    fn oversized_history_rejected() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path().join(WORKSPACE_DIR);
        fs::create_dir_all(&ws).unwrap();
        fs::write(ws.join("config.toml"), "[history]\nlimit = 999999\n").unwrap();

        assert!(Config::for_workspace(dir.path()).is_err());
    }

    #[test]
    fn find_workspace_root_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(WORKSPACE_DIR)).unwrap();
        let sub_dir = dir.path().join("sub").join("dir");
        fs::create_dir_all(&sub_dir).unwrap();

        let root = Config::find_workspace_root_from(&sub_dir);
        assert_eq!(root.as_deref(), Some(dir.path()));
    }
}
