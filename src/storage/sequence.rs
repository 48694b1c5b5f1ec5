//! File-backed sequence counters
//!
//! Each named sequence lives in `<dir>/<name>.seq` as a decimal number: the
//! next value to hand out. Increments hold an exclusive `fs2` lock on the
//! file, so concurrent processes never receive the same value.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::domain::{IdError, SequenceSource};

/// Named counters stored as small lock-protected files
#[derive(Debug, Clone)]
pub struct FileSequence {
    dir: PathBuf,
}

impl FileSequence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn increment(&self, name: &str) -> std::io::Result<u64> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.seq", name));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        file.lock_exclusive()?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let current = match content.trim() {
            "" => 0,
            digits => digits.parse::<u64>().map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("corrupt counter in {}: {}", path.display(), e),
                )
            })?,
        };

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", current + 1)?;
        file.sync_all()?;

        // Lock is released when file is dropped
        Ok(current)
    }
}

impl SequenceSource for FileSequence {
    fn next_sequence(&self, name: &str) -> Result<u64, IdError> {
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(IdError::Sequence {
                name: name.to_string(),
                reason: "invalid sequence name".to_string(),
            });
        }

        self.increment(name).map_err(|e| IdError::Sequence {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{render_base64, ProjectIdAllocator};
    use std::collections::HashSet;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn counts_from_zero() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequence::new(dir.path());

        assert_eq!(seq.next_sequence("projects").unwrap(), 0);
        assert_eq!(seq.next_sequence("projects").unwrap(), 1);
        assert_eq!(seq.next_sequence("other").unwrap(), 0);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        FileSequence::new(dir.path()).next_sequence("projects").unwrap();

        let reopened = FileSequence::new(dir.path());
        assert_eq!(reopened.next_sequence("projects").unwrap(), 1);
    }

    #[test]
    fn rejects_bad_names_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequence::new(dir.path());
        assert!(seq.next_sequence("../x").is_err());

        fs::write(dir.path().join("broken.seq"), "not a number").unwrap();
        assert!(matches!(
            seq.next_sequence("broken"),
            Err(IdError::Sequence { .. })
        ));
    }

    #[test]
    fn concurrent_allocation_is_gapless() {
        const THREADS: u64 = 6;
        const PER_THREAD: u64 = 25;

        let dir = TempDir::new().unwrap();
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let seq = FileSequence::new(dir.path());
                thread::spawn(move || {
                    let allocator = ProjectIdAllocator::new(seq);
                    (0..PER_THREAD)
                        .map(|_| allocator.next_id().unwrap().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let issued: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<&String> = issued.iter().collect();
        assert_eq!(unique.len(), issued.len());

        let expected: HashSet<String> = (0..THREADS * PER_THREAD).map(render_base64).collect();
        let issued: HashSet<String> = issued.into_iter().collect();
        assert_eq!(issued, expected);
    }
}
