//! Identifiers and the three allocation domains
//!
//! - Project IDs: an externally owned counter (see [`SequenceSource`]) rendered
//!   in the 64-symbol alphabet, most significant digit first (`a`, `b`, ... `_`,
//!   `ba`, ...). Ordered by creation.
//! - Task IDs: per-document, the current task count in base 36, bumped on
//!   collision. No shared state.
//! - Resurrection IDs: merge-time remapping, counting up from zero in the
//!   64-symbol alphabet and skipping every id either document already uses.
//!
//! Every retry loop is bounded; running past the bound is an internal error.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid task ID: '{0}' (expected 1-64 characters from [A-Za-z0-9_-])")]
    InvalidTaskId(String),

    #[error("Invalid project ID: '{0}' (expected 1-64 characters from [A-Za-z0-9_-])")]
    InvalidProjectId(String),

    #[error("ID allocator exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },

    #[error("Sequence '{name}' unavailable: {reason}")]
    Sequence { name: String, reason: String },
}

/// Symbols for project and resurrection IDs. Index 0 renders the value zero.
pub const ALPHABET_64: &[u8; 64] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

const ALPHABET_36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const MAX_ID_LEN: usize = 64;

fn render(mut value: u64, alphabet: &[u8]) -> String {
    let base = alphabet.len() as u64;
    let mut digits = Vec::new();
    loop {
        digits.push(alphabet[(value % base) as usize] as char);
        value /= base;
        if value == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Renders a value in the 64-symbol alphabet, most significant digit first
pub fn render_base64(value: u64) -> String {
    render(value, ALPHABET_64)
}

/// Renders a value in lowercase base 36
pub fn render_base36(value: u64) -> String {
    render(value, ALPHABET_36)
}

/// Upper bound on allocation attempts given the number of known ids
fn retry_limit(known: usize) -> usize {
    known.saturating_add(1).saturating_mul(10)
}

fn is_valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_ID_LEN
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Task identifier, unique within a project (tombstones included)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !is_valid_id(s) {
            return Err(IdError::InvalidTaskId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Project identifier, allocated from a shared sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProjectId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !is_valid_id(s) {
            return Err(IdError::InvalidProjectId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ProjectId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

/// Atomic increment-and-read capability owned by the storage layer
///
/// Each call must return the next integer of the named sequence exactly once,
/// starting at zero, even under concurrent callers.
pub trait SequenceSource {
    fn next_sequence(&self, name: &str) -> Result<u64, IdError>;
}

impl<T: SequenceSource + ?Sized> SequenceSource for &T {
    fn next_sequence(&self, name: &str) -> Result<u64, IdError> {
        (**self).next_sequence(name)
    }
}

impl<T: SequenceSource + ?Sized> SequenceSource for std::sync::Arc<T> {
    fn next_sequence(&self, name: &str) -> Result<u64, IdError> {
        (**self).next_sequence(name)
    }
}

/// In-process sequence counters
#[derive(Debug, Default)]
pub struct MemorySequence {
    counters: Mutex<HashMap<String, u64>>,
}

impl MemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceSource for MemorySequence {
    fn next_sequence(&self, name: &str) -> Result<u64, IdError> {
        let mut counters = self.counters.lock().map_err(|_| IdError::Sequence {
            name: name.to_string(),
            reason: "counter lock poisoned".to_string(),
        })?;
        let counter = counters.entry(name.to_string()).or_insert(0);
        let value = *counter;
        *counter += 1;
        Ok(value)
    }
}

/// Allocates project IDs from an injected sequence
pub struct ProjectIdAllocator<S> {
    source: S,
    sequence: String,
}

impl<S: SequenceSource> ProjectIdAllocator<S> {
    /// Sequence name used when none is given
    pub const DEFAULT_SEQUENCE: &'static str = "projects";

    pub fn new(source: S) -> Self {
        Self::with_sequence(source, Self::DEFAULT_SEQUENCE)
    }

    pub fn with_sequence(source: S, sequence: impl Into<String>) -> Self {
        Self {
            source,
            sequence: sequence.into(),
        }
    }

    /// Takes the next integer from the sequence and renders it
    pub fn next_id(&self) -> Result<ProjectId, IdError> {
        let value = self.source.next_sequence(&self.sequence)?;
        Ok(ProjectId(render_base64(value)))
    }
}

/// Allocates a task ID that no existing task (live or tombstoned) holds
pub fn allocate_task_id<'a>(
    existing: impl IntoIterator<Item = &'a TaskId>,
) -> Result<TaskId, IdError> {
    let taken: HashSet<&str> = existing.into_iter().map(TaskId::as_str).collect();
    let attempts = retry_limit(taken.len());

    let mut candidate = taken.len() as u64;
    for _ in 0..attempts {
        let id = render_base36(candidate);
        if !taken.contains(id.as_str()) {
            return Ok(TaskId(id));
        }
        candidate += 1;
    }

    Err(IdError::Exhausted { attempts })
}

/// Issues fresh IDs for displaced tasks during a merge
#[derive(Debug)]
pub struct ResurrectionAllocator {
    taken: HashSet<String>,
    next: u64,
}

impl ResurrectionAllocator {
    /// Creates an allocator that avoids every id in `taken`
    pub fn new<'a>(taken: impl IntoIterator<Item = &'a TaskId>) -> Self {
        Self {
            taken: taken.into_iter().map(|id| id.0.clone()).collect(),
            next: 0,
        }
    }

    pub fn allocate(&mut self) -> Result<TaskId, IdError> {
        let attempts = retry_limit(self.taken.len());
        for _ in 0..attempts {
            let candidate = render_base64(self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return Ok(TaskId(candidate));
            }
        }
        Err(IdError::Exhausted { attempts })
    }
}
