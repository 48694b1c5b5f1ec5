//! Task and project document model
//!
//! A [`ProjectDocument`] is the unit the codec and the merge engine operate
//! on. Its tasks form a forest through `parent_id`; deleted tasks stay in the
//! list as tombstones so deletions merge deterministically.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::{ProjectId, TaskId};

#[derive(Debug, Error, PartialEq)]
pub enum StatusError {
    #[error("Unknown status code: {0} (expected 0-3)")]
    UnknownCode(u8),

    #[error("Unknown status: '{0}' (expected not-started, in-progress, done or suspended)")]
    UnknownName(String),
}

/// Status of a task, stored as its small integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
    Suspended,
}

impl TaskStatus {
    pub fn code(self) -> u8 {
        match self {
            TaskStatus::NotStarted => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Done => 2,
            TaskStatus::Suspended => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
            TaskStatus::Suspended => "suspended",
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = StatusError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TaskStatus::NotStarted),
            1 => Ok(TaskStatus::InProgress),
            2 => Ok(TaskStatus::Done),
            3 => Ok(TaskStatus::Suspended),
            other => Err(StatusError::UnknownCode(other)),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "0" | "not-started" | "todo" => Ok(TaskStatus::NotStarted),
            "1" | "in-progress" | "doing" => Ok(TaskStatus::InProgress),
            "2" | "done" => Ok(TaskStatus::Done),
            "3" | "suspended" | "paused" => Ok(TaskStatus::Suspended),
            _ => Err(StatusError::UnknownName(s.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Task deadline
///
/// Older documents store deadlines as a day offset from the project start
/// date; newer ones store an absolute instant. Both are read and written
/// back verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Deadline {
    /// Days after the document's `start_date`
    DayOffset(i64),
    /// Absolute point in time
    At(DateTime<Utc>),
}

impl Deadline {
    /// Resolves the deadline to an instant, if the anchor is known
    pub fn resolve(&self, start_date: Option<NaiveDate>) -> Option<DateTime<Utc>> {
        match self {
            Deadline::At(at) => Some(*at),
            Deadline::DayOffset(days) => {
                let start = start_date?.and_hms_opt(0, 0, 0)?.and_utc();
                start.checked_add_signed(Duration::try_days(*days)?)
            }
        }
    }
}

/// A node in the task forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub name: String,

    #[serde(default)]
    pub status: TaskStatus,

    /// Parent task; `None` for roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Deadline>,

    /// Position among siblings
    #[serde(default)]
    pub order: i64,

    pub last_updated: DateTime<Utc>,

    /// Tombstone flag
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            status: TaskStatus::NotStarted,
            parent_id: None,
            deadline: None,
            order: 0,
            last_updated: now,
            is_deleted: false,
        }
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Returns true unless the task is a tombstone
    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }
}

/// Cloud/sharing attributes carried along with a document
///
/// The core never inspects or mutates this record; it only passes it through.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharingRecord(serde_json::Map<String, serde_json::Value>);

impl SharingRecord {
    pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

/// A project: identity, name and its task forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub id: ProjectId,

    pub project_name: String,

    /// Anchor for day-offset deadlines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing: Option<SharingRecord>,
}

impl ProjectDocument {
    /// Creates an empty document
    pub fn new(id: ProjectId, project_name: impl Into<String>) -> Self {
        Self {
            id,
            project_name: project_name.into(),
            start_date: None,
            tasks: Vec::new(),
            last_synced: None,
            sharing: None,
        }
    }

    /// Looks up a task by id, tombstones included
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Iterates over non-deleted tasks
    pub fn live_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_live())
    }

    /// Returns true if this document and `other` describe the same logical project
    pub fn same_project(&self, other: &ProjectDocument) -> bool {
        self.id == other.id || self.project_name == other.project_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn status_serializes_as_code() {
        assert_eq!(serde_json::to_string(&TaskStatus::Suspended).unwrap(), "3");
        let parsed: TaskStatus = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, TaskStatus::InProgress);
        assert!(serde_json::from_str::<TaskStatus>("4").is_err());
    }

    #[test]
    fn status_parses_names() {
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("Done".parse::<TaskStatus>().unwrap(), TaskStatus::Done);
        assert!("finished".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn deadline_reads_both_representations() {
        let offset: Deadline = serde_json::from_str("14").unwrap();
        assert_eq!(offset, Deadline::DayOffset(14));

        let at: Deadline = serde_json::from_str("\"2024-03-01T09:30:00Z\"").unwrap();
        assert_eq!(at, Deadline::At(ts()));
    }

    #[test]
    fn deadline_resolution() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1);
        let resolved = Deadline::DayOffset(29).resolve(start).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        assert_eq!(Deadline::DayOffset(3).resolve(None), None);
        assert_eq!(Deadline::At(ts()).resolve(None), Some(ts()));
    }

    #[test]
    fn task_json_omits_defaults() {
        let task = Task::new("0".parse().unwrap(), "Write plan", ts());
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["name"], "Write plan");
        assert_eq!(json["status"], 0);
        assert!(json.get("parentId").is_none());
        assert!(json.get("isDeleted").is_none());
        assert_eq!(json["lastUpdated"], "2024-03-01T09:30:00Z");
    }

    #[test]
    fn document_roundtrip_preserves_sharing() {
        let mut doc = ProjectDocument::new("a".parse().unwrap(), "Launch");
        let mut fields = serde_json::Map::new();
        fields.insert("owner".to_string(), serde_json::json!({"uid": 7, "tags": ["x"]}));
        doc.sharing = Some(SharingRecord::new(fields));
        doc.tasks.push(Task::new("0".parse().unwrap(), "Plan", ts()));

        let json = serde_json::to_string(&doc).unwrap();
        let parsed: ProjectDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn same_project_by_id_or_name() {
        let a = ProjectDocument::new("a".parse().unwrap(), "Launch");
        let b = ProjectDocument::new("b".parse().unwrap(), "Launch");
        let c = ProjectDocument::new("a".parse().unwrap(), "Other");
        let d = ProjectDocument::new("d".parse().unwrap(), "Other");

        assert!(a.same_project(&b));
        assert!(a.same_project(&c));
        assert!(!a.same_project(&d));
    }
}
