//! JSONL storage for project documents
//!
//! Each key maps to `<dir>/<key>.jsonl` holding one canonical document per
//! line. Uses file locking for concurrent access safety.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use tracing::debug;

use crate::codec::{from_canonical, to_canonical};
use crate::domain::ProjectDocument;

/// Keyed store of project document lists
pub struct DocumentStore {
    dir: PathBuf,
}

fn check_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid {
        bail!("Invalid storage key: '{}'", key);
    }
    Ok(())
}

impl DocumentStore {
    /// Creates a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file backing a key
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.dir.join(format!("{}.jsonl", key)))
    }

    /// Loads the documents stored under `key`; `None` if nothing was ever saved
    pub fn load(&self, key: &str) -> Result<Option<Vec<ProjectDocument>>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)
            .with_context(|| format!("Failed to open document store: {}", path.display()))?;

        file.lock_shared()
            .context("Failed to acquire read lock on document store")?;

        let reader = BufReader::new(&file);
        let mut documents = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;
            if line.trim().is_empty() {
                continue;
            }

            let doc = from_canonical(&line).with_context(|| {
                format!("Failed to parse document at {}:{}", path.display(), line_num + 1)
            })?;
            documents.push(doc);
        }

        debug!(key, count = documents.len(), "loaded documents");
        Ok(Some(documents))
    }

    /// Replaces the documents stored under `key`
    pub fn save(&self, key: &str, documents: &[ProjectDocument]) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;

        let temp_path = path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on document store")?;

            let mut writer = BufWriter::new(&file);
            for doc in documents {
                let line = to_canonical(doc)
                    .with_context(|| format!("Failed to serialize project {}", doc.id))?;
                writeln!(writer, "{}", line).context("Failed to write document")?;
            }

            writer.flush().context("Failed to flush document store")?;
        }

        fs::rename(&temp_path, &path).with_context(|| {
            format!("Failed to rename {} to {}", temp_path.display(), path.display())
        })?;

        debug!(key, count = documents.len(), "saved documents");
        Ok(())
    }

    /// Removes a key; returns whether anything was stored
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_doc(id: &str, name: &str) -> ProjectDocument {
        let mut doc = ProjectDocument::new(id.parse().unwrap(), name);
        doc.tasks
            .push(Task::new("0".parse().unwrap(), "First", Utc::now()));
        doc
    }

    #[test]
    fn load_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());

        assert!(store.load("projects").unwrap().is_none());
    }

    #[test]
    fn save_and_load_documents() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        let docs = vec![make_doc("a", "Garden"), make_doc("b", "Kitchen")];

        store.save("projects", &docs).unwrap();

        assert_eq!(store.load("projects").unwrap(), Some(docs));
    }

    #[test]
    fn saving_empty_list_is_distinct_from_missing() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());

        store.save("projects", &[]).unwrap();
        assert_eq!(store.load("projects").unwrap(), Some(vec![]));
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());

        assert!(store.load("../escape").is_err());
        assert!(store.save("", &[]).is_err());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path().join("nested").join("docs"));

        store.save("projects", &[make_doc("a", "Garden")]).unwrap();
        assert!(store.path_for("projects").unwrap().exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());

        store.save("projects", &[make_doc("a", "Garden")]).unwrap();

        let temp_path = store
            .path_for("projects")
            .unwrap()
            .with_extension("jsonl.tmp");
        assert!(!temp_path.exists());
    }

    #[test]
    fn corrupt_line_reports_location() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        fs::write(store.path_for("projects").unwrap(), "{broken\n").unwrap();

        let err = store.load("projects").unwrap_err();
        assert!(format!("{:#}", err).contains("projects.jsonl:1"));
    }

    #[test]
    fn remove_key() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        store.save("projects", &[]).unwrap();

        assert!(store.remove("projects").unwrap());
        assert!(!store.remove("projects").unwrap());
    }
}
