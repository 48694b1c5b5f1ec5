//! Row-based merge of two divergent copies of a project
//!
//! A [`MergeSession`] lines up the live tasks of `local` and `remote` by id,
//! one [`MergeRow`] per id. Every row gets a default [`RowAction`] from the
//! session [`Priority`]; the user may override actions, rename rows, or
//! resurrect a conflicting row so both versions survive as separate tasks.
//!
//! `commit` builds the merged forest, refusing to produce anything when two
//! surviving tasks would share a name under the same parent. Rows are held in
//! id order so the same inputs and choices always yield the same document.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::forest::{clear_orphans, sibling_name_groups, validate, ForestError};
use super::id::{IdError, ResurrectionAllocator, TaskId};
use super::status::propagate;
use super::task::{Deadline, ProjectDocument, Task};

/// Which side wins two-sided rows that differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Local,
    Remote,
    /// Later `lastUpdated` wins; edits within the same minute favor local
    Newest,
}

impl FromStr for Priority {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Priority::Local),
            "remote" => Ok(Priority::Remote),
            "newest" => Ok(Priority::Newest),
            _ => Err(MergeError::UnknownPriority(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Local => "local",
            Priority::Remote => "remote",
            Priority::Newest => "newest",
        })
    }
}

/// Which documents hold a live task with the row's id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presence {
    LocalOnly,
    RemoteOnly,
    Both,
}

/// Resolution of a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowAction {
    KeepLocal,
    KeepRemote,
    Delete,
    AddRemote,
}

impl RowAction {
    fn is_allowed(self, presence: Presence) -> bool {
        match self {
            RowAction::KeepLocal => presence != Presence::RemoteOnly,
            RowAction::KeepRemote | RowAction::AddRemote => presence != Presence::LocalOnly,
            RowAction::Delete => true,
        }
    }
}

impl FromStr for RowAction {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "keep-local" | "local" => Ok(RowAction::KeepLocal),
            "keep-remote" | "remote" => Ok(RowAction::KeepRemote),
            "delete" => Ok(RowAction::Delete),
            "add-remote" | "add" => Ok(RowAction::AddRemote),
            _ => Err(MergeError::UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowAction::KeepLocal => "keep-local",
            RowAction::KeepRemote => "keep-remote",
            RowAction::Delete => "delete",
            RowAction::AddRemote => "add-remote",
        })
    }
}

/// Two or more surviving tasks that would share a name under one parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateName {
    pub parent: Option<TaskId>,
    pub name: String,
    pub ids: Vec<TaskId>,
}

impl fmt::Display for DuplicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.ids.iter().map(TaskId::as_str).collect();
        match &self.parent {
            Some(parent) => write!(f, "'{}' under {} ({})", self.name, parent, ids.join(", ")),
            None => write!(f, "'{}' at the root ({})", self.name, ids.join(", ")),
        }
    }
}

fn describe_duplicates(duplicates: &[DuplicateName]) -> String {
    duplicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, PartialEq)]
pub enum MergeError {
    #[error("No merge row for task {0}")]
    UnknownRow(TaskId),

    #[error("Action {action} is not possible for task {id}: the task is missing on that side")]
    InvalidAction { id: TaskId, action: RowAction },

    #[error("Task {0} cannot be resurrected: only differing two-sided rows kept as local can")]
    CannotResurrect(TaskId),

    #[error("Task names must not be empty")]
    EmptyName,

    #[error("Duplicate task names would be created: {}", describe_duplicates(.0))]
    DuplicateNames(Vec<DuplicateName>),

    #[error("Unknown merge priority: '{0}' (expected local, remote or newest)")]
    UnknownPriority(String),

    #[error("Unknown row action: '{0}' (expected keep-local, keep-remote, delete or add-remote)")]
    UnknownAction(String),

    #[error("The {side} copy is not a valid task forest: {source}")]
    InvalidInput {
        side: &'static str,
        source: ForestError,
    },

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Forest(#[from] ForestError),
}

/// One id of the merge, with both sides and the chosen resolution
#[derive(Debug, Clone, Serialize)]
pub struct MergeRow {
    pub id: TaskId,
    pub presence: Presence,
    pub local: Option<Task>,
    pub remote: Option<Task>,
    pub is_identical: bool,
    /// Shown for review: differs itself, or some descendant does
    pub visible: bool,
    pub action: RowAction,
    pub resurrect: bool,
    pub rename: Option<String>,
    /// The id is tombstoned in the document that lacks the live task
    pub tombstoned: bool,
    #[serde(skip)]
    overridden: bool,
}

impl MergeRow {
    /// Name the row will carry after merge
    pub fn resolved_name(&self) -> Option<&str> {
        if let Some(name) = &self.rename {
            return Some(name);
        }
        let task = match self.action {
            RowAction::KeepLocal => self.local.as_ref(),
            RowAction::KeepRemote | RowAction::AddRemote => self.remote.as_ref(),
            RowAction::Delete => None,
        };
        task.map(|t| t.name.as_str())
    }
}

/// Result of a committed merge
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Both sides already hold the same forest
    NothingToMerge,
    Merged(ProjectDocument),
}

fn minute(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

fn same_deadline(
    a: Option<&Deadline>,
    a_start: Option<NaiveDate>,
    b: Option<&Deadline>,
    b_start: Option<NaiveDate>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => match (x.resolve(a_start), y.resolve(b_start)) {
            (Some(p), Some(q)) => p == q,
            _ => x == y,
        },
        _ => false,
    }
}

/// An in-progress merge of `remote` into `local`
#[derive(Debug, Clone)]
pub struct MergeSession {
    local: ProjectDocument,
    remote: ProjectDocument,
    priority: Priority,
    rows: BTreeMap<TaskId, MergeRow>,
}

impl MergeSession {
    /// Lines up both documents and assigns default actions
    pub fn begin(local: ProjectDocument, remote: ProjectDocument, priority: Priority) -> Self {
        let local_live: BTreeMap<&TaskId, &Task> =
            local.live_tasks().map(|t| (&t.id, t)).collect();
        let remote_live: BTreeMap<&TaskId, &Task> =
            remote.live_tasks().map(|t| (&t.id, t)).collect();
        let local_dead: HashSet<&TaskId> = local
            .tasks
            .iter()
            .filter(|t| t.is_deleted)
            .map(|t| &t.id)
            .collect();
        let remote_dead: HashSet<&TaskId> = remote
            .tasks
            .iter()
            .filter(|t| t.is_deleted)
            .map(|t| &t.id)
            .collect();

        let ids: BTreeSet<&TaskId> = local_live.keys().chain(remote_live.keys()).copied().collect();

        let mut rows = BTreeMap::new();
        for id in ids {
            let l = local_live.get(id).copied();
            let r = remote_live.get(id).copied();
            let (presence, is_identical, tombstoned) = match (l, r) {
                (Some(l), Some(r)) => {
                    let identical = l.name == r.name
                        && l.status == r.status
                        && l.parent_id == r.parent_id
                        && same_deadline(
                            l.deadline.as_ref(),
                            local.start_date,
                            r.deadline.as_ref(),
                            remote.start_date,
                        );
                    (Presence::Both, identical, false)
                }
                (Some(_), None) => (Presence::LocalOnly, false, remote_dead.contains(id)),
                _ => (Presence::RemoteOnly, false, local_dead.contains(id)),
            };

            rows.insert(
                id.clone(),
                MergeRow {
                    id: id.clone(),
                    presence,
                    local: l.cloned(),
                    remote: r.cloned(),
                    is_identical,
                    visible: true,
                    action: RowAction::KeepLocal,
                    resurrect: false,
                    rename: None,
                    tombstoned,
                    overridden: false,
                },
            );
        }

        let mut session = Self {
            local,
            remote,
            priority,
            rows,
        };
        session.apply_defaults();
        session.mark_visibility();

        debug!(
            rows = session.rows.len(),
            conflicts = session.rows.values().filter(|r| !r.is_identical).count(),
            %priority,
            "merge session started"
        );
        session
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Changes the priority; rows the user resolved explicitly keep their action
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.apply_defaults();
    }

    fn default_action(&self, row: &MergeRow) -> RowAction {
        match row.presence {
            Presence::LocalOnly if row.tombstoned => RowAction::Delete,
            Presence::RemoteOnly if row.tombstoned => RowAction::Delete,
            Presence::LocalOnly => RowAction::KeepLocal,
            Presence::RemoteOnly => RowAction::AddRemote,
            Presence::Both if row.is_identical => RowAction::KeepLocal,
            Presence::Both => match self.priority {
                Priority::Local => RowAction::KeepLocal,
                Priority::Remote => RowAction::KeepRemote,
                Priority::Newest => match (&row.local, &row.remote) {
                    (Some(l), Some(r)) if minute(r.last_updated) > minute(l.last_updated) => {
                        RowAction::KeepRemote
                    }
                    _ => RowAction::KeepLocal,
                },
            },
        }
    }

    fn apply_defaults(&mut self) {
        let defaults: Vec<(TaskId, RowAction)> = self
            .rows
            .values()
            .filter(|row| !row.overridden)
            .map(|row| (row.id.clone(), self.default_action(row)))
            .collect();
        for (id, action) in defaults {
            if let Some(row) = self.rows.get_mut(&id) {
                row.action = action;
                if action != RowAction::KeepLocal {
                    row.resurrect = false;
                }
            }
        }
    }

    /// A row is visible when it, or any descendant on either side, differs
    fn mark_visibility(&mut self) {
        let mut children: HashMap<TaskId, BTreeSet<TaskId>> = HashMap::new();
        for task in self.local.live_tasks().chain(self.remote.live_tasks()) {
            if let Some(parent) = &task.parent_id {
                children
                    .entry(parent.clone())
                    .or_default()
                    .insert(task.id.clone());
            }
        }

        let differing: HashSet<&TaskId> = self
            .rows
            .values()
            .filter(|r| !r.is_identical)
            .map(|r| &r.id)
            .collect();

        let mut visible = HashMap::new();
        for id in self.rows.keys() {
            let mut stack = vec![id];
            let mut seen = HashSet::new();
            let mut found = false;
            while let Some(current) = stack.pop() {
                if !seen.insert(current) {
                    continue;
                }
                if differing.contains(current) {
                    found = true;
                    break;
                }
                if let Some(kids) = children.get(current) {
                    stack.extend(kids.iter());
                }
            }
            visible.insert(id.clone(), found);
        }

        for (id, found) in visible {
            if let Some(row) = self.rows.get_mut(&id) {
                row.visible = found;
            }
        }
    }

    fn row_mut(&mut self, id: &TaskId) -> Result<&mut MergeRow, MergeError> {
        self.rows
            .get_mut(id)
            .ok_or_else(|| MergeError::UnknownRow(id.clone()))
    }

    /// Overrides the action of one row
    pub fn resolve_row(&mut self, id: &TaskId, action: RowAction) -> Result<(), MergeError> {
        let row = self.row_mut(id)?;
        if !action.is_allowed(row.presence) {
            warn!(task = %id, %action, "rejected merge action");
            return Err(MergeError::InvalidAction {
                id: id.clone(),
                action,
            });
        }
        row.action = action;
        row.overridden = true;
        if action != RowAction::KeepLocal {
            row.resurrect = false;
        }
        Ok(())
    }

    /// Sets the name the row's surviving task will carry
    ///
    /// On a resurrected row the rename applies to the remote copy.
    pub fn rename(&mut self, id: &TaskId, name: impl Into<String>) -> Result<(), MergeError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(MergeError::EmptyName);
        }
        self.row_mut(id)?.rename = Some(name);
        Ok(())
    }

    /// Drops a rename overlay
    pub fn clear_rename(&mut self, id: &TaskId) -> Result<(), MergeError> {
        self.row_mut(id)?.rename = None;
        Ok(())
    }

    /// Keeps both versions of a differing row kept as local
    pub fn resurrect(&mut self, id: &TaskId, enabled: bool) -> Result<(), MergeError> {
        let row = self.row_mut(id)?;
        if enabled
            && (row.presence != Presence::Both
                || row.is_identical
                || row.action != RowAction::KeepLocal)
        {
            return Err(MergeError::CannotResurrect(id.clone()));
        }
        row.resurrect = enabled;
        Ok(())
    }

    pub fn rows(&self) -> impl Iterator<Item = &MergeRow> {
        self.rows.values()
    }

    /// Rows that need review
    pub fn view(&self) -> impl Iterator<Item = &MergeRow> {
        self.rows.values().filter(|r| r.visible)
    }

    pub fn row(&self, id: &TaskId) -> Option<&MergeRow> {
        self.rows.get(id)
    }

    /// Returns true when both sides hold the same live forest
    pub fn is_noop(&self) -> bool {
        self.rows
            .values()
            .all(|r| r.presence == Presence::Both && r.is_identical)
    }

    /// Builds the merged document
    ///
    /// Nothing is produced unless every guard passes.
    pub fn commit(&self, now: DateTime<Utc>) -> Result<MergeOutcome, MergeError> {
        for (side, doc) in [("local", &self.local), ("remote", &self.remote)] {
            validate(&doc.tasks).map_err(|source| MergeError::InvalidInput { side, source })?;
        }

        if self.is_noop() {
            debug!(project = %self.local.id, "nothing to merge");
            return Ok(MergeOutcome::NothingToMerge);
        }

        let plain = self.build(false, now)?;
        check_duplicates(&plain)?;

        let mut tasks = self.build(true, now)?;
        check_duplicates(&tasks)?;
        self.append_tombstones(&mut tasks, now);

        validate(&tasks)?;
        propagate(&mut tasks, now)?;

        let mut doc = self.local.clone();
        doc.tasks = tasks;
        doc.last_synced = Some(now);

        info!(
            project = %doc.id,
            tasks = doc.live_tasks().count(),
            resurrected = self.rows.values().filter(|r| r.resurrect).count(),
            "merge committed"
        );
        Ok(MergeOutcome::Merged(doc))
    }

    /// Emits the live tasks chosen by every row
    fn build(&self, with_resurrection: bool, now: DateTime<Utc>) -> Result<Vec<Task>, MergeError> {
        let mut allocator = ResurrectionAllocator::new(
            self.local
                .tasks
                .iter()
                .chain(self.remote.tasks.iter())
                .map(|t| &t.id),
        );
        let mut moved: HashMap<TaskId, TaskId> = HashMap::new();
        let mut tasks = Vec::new();

        for row in self.rows.values() {
            let (chosen, from_remote) = match row.action {
                RowAction::Delete => continue,
                RowAction::KeepLocal => (row.local.as_ref(), false),
                RowAction::KeepRemote | RowAction::AddRemote => (row.remote.as_ref(), true),
            };
            let Some(chosen) = chosen else {
                return Err(MergeError::InvalidAction {
                    id: row.id.clone(),
                    action: row.action,
                });
            };

            if with_resurrection && row.resurrect {
                if let (Some(local), Some(remote)) = (&row.local, &row.remote) {
                    let new_id = allocator.allocate()?;
                    debug!(task = %row.id, new_id = %new_id, "resurrecting local copy");

                    let mut displaced = local.clone();
                    displaced.id = new_id.clone();
                    displaced.touch(now);
                    moved.insert(row.id.clone(), new_id);

                    tasks.push(displaced);
                    tasks.push(with_rename(&self.rebased(remote), row.rename.as_deref(), now));
                    continue;
                }
            }

            let emitted = if from_remote {
                self.rebased(chosen)
            } else {
                chosen.clone()
            };
            tasks.push(with_rename(&emitted, row.rename.as_deref(), now));
        }

        if !moved.is_empty() {
            for task in &mut tasks {
                if let Some(new_parent) = task.parent_id.as_ref().and_then(|p| moved.get(p)) {
                    task.parent_id = Some(new_parent.clone());
                }
            }
        }

        let cleared = clear_orphans(&mut tasks);
        if !cleared.is_empty() {
            debug!(count = cleared.len(), "moved orphaned tasks to the root");
        }
        Ok(tasks)
    }

    /// Copy of a remote task whose day-offset deadline names the same day
    /// under the local start date
    ///
    /// Without a local start date the deadline becomes an absolute instant.
    /// An offset the remote never anchored is kept as is.
    fn rebased(&self, task: &Task) -> Task {
        let mut task = task.clone();
        let (local_start, remote_start) = (self.local.start_date, self.remote.start_date);
        if local_start == remote_start {
            return task;
        }
        let Some(deadline @ Deadline::DayOffset(_)) = task.deadline else {
            return task;
        };
        let Some(resolved) = deadline.resolve(remote_start) else {
            return task;
        };

        task.deadline = Some(match local_start {
            Some(start) => Deadline::DayOffset((resolved.date_naive() - start).num_days()),
            None => Deadline::At(resolved),
        });
        debug!(task = %task.id, ?deadline, rebased = ?task.deadline, "re-anchored remote deadline");
        task
    }

    /// Keeps deleted ids reserved so they are never reissued
    fn append_tombstones(&self, tasks: &mut Vec<Task>, now: DateTime<Utc>) {
        let mut present: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();

        let old_tombstones = self
            .local
            .tasks
            .iter()
            .chain(self.remote.tasks.iter())
            .filter(|t| t.is_deleted);
        for task in old_tombstones {
            if present.insert(task.id.clone()) {
                tasks.push(task.clone());
            }
        }

        for row in self.rows.values().filter(|r| r.action == RowAction::Delete) {
            if let Some(task) = row.local.as_ref().or(row.remote.as_ref()) {
                if present.insert(task.id.clone()) {
                    let mut tombstone = task.clone();
                    tombstone.is_deleted = true;
                    tombstone.touch(now);
                    tasks.push(tombstone);
                }
            }
        }
    }
}

fn with_rename(task: &Task, rename: Option<&str>, now: DateTime<Utc>) -> Task {
    let mut task = task.clone();
    if let Some(name) = rename {
        if task.name != name {
            task.name = name.to_string();
            task.touch(now);
        }
    }
    task
}

fn check_duplicates(tasks: &[Task]) -> Result<(), MergeError> {
    let duplicates: Vec<DuplicateName> = sibling_name_groups(tasks)
        .into_iter()
        .map(|((parent, name), ids)| DuplicateName { parent, name, ids })
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }
    warn!(count = duplicates.len(), "merge blocked by duplicate names");
    Err(MergeError::DuplicateNames(duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use chrono::TimeZone;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 10, min, 0).unwrap()
    }

    fn task(i: &str, name: &str, status: TaskStatus, parent: Option<&str>) -> Task {
        let mut t = Task::new(id(i), name, at(0)).with_status(status);
        t.parent_id = parent.map(id);
        t
    }

    fn doc(tasks: Vec<Task>) -> ProjectDocument {
        let mut d = ProjectDocument::new("a".parse().unwrap(), "Launch");
        d.tasks = tasks;
        d
    }

    fn merged(outcome: MergeOutcome) -> ProjectDocument {
        match outcome {
            MergeOutcome::Merged(doc) => doc,
            MergeOutcome::NothingToMerge => panic!("expected a merged document"),
        }
    }

    fn live<'a>(doc: &'a ProjectDocument, i: &str) -> &'a Task {
        doc.live_tasks().find(|t| t.id == id(i)).unwrap()
    }

    fn status_pair() -> (ProjectDocument, ProjectDocument) {
        let local = doc(vec![
            task("a", "Write plan", TaskStatus::Done, None),
            task("b", "Review", TaskStatus::InProgress, Some("a")),
        ]);
        let remote = doc(vec![
            task("a", "Write plan", TaskStatus::Done, None),
            task("b", "Review", TaskStatus::Done, Some("a")),
        ]);
        (local, remote)
    }

    #[test]
    fn identical_documents_are_a_noop() {
        let (local, _) = status_pair();
        let session = MergeSession::begin(local.clone(), local, Priority::Remote);

        assert!(session.is_noop());
        assert_eq!(session.view().count(), 0);
        assert_eq!(session.commit(at(5)).unwrap(), MergeOutcome::NothingToMerge);
    }

    #[test]
    fn order_and_timestamps_do_not_break_identity() {
        let (local, _) = status_pair();
        let mut remote = local.clone();
        remote.tasks[1].order = 9;
        remote.tasks[1].last_updated = at(30);

        let session = MergeSession::begin(local, remote, Priority::Local);
        assert!(session.is_noop());
    }

    #[test]
    fn local_priority_keeps_local_status() {
        let (local, remote) = status_pair();
        let session = MergeSession::begin(local, remote, Priority::Local);

        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "b").status, TaskStatus::InProgress);
        assert_eq!(doc.last_synced, Some(at(5)));
    }

    #[test]
    fn remote_priority_takes_remote_status() {
        let (local, remote) = status_pair();
        let session = MergeSession::begin(local, remote, Priority::Remote);

        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "b").status, TaskStatus::Done);
        assert_eq!(live(&doc, "a").status, TaskStatus::Done);
    }

    #[test]
    fn changing_priority_keeps_explicit_choices() {
        let (mut local, mut remote) = status_pair();
        local.tasks.push(task("c", "Ship", TaskStatus::NotStarted, None));
        remote.tasks.push(task("c", "Ship", TaskStatus::InProgress, None));

        let mut session = MergeSession::begin(local, remote, Priority::Local);
        session.resolve_row(&id("c"), RowAction::KeepRemote).unwrap();
        session.set_priority(Priority::Remote);
        session.set_priority(Priority::Local);

        assert_eq!(session.row(&id("b")).unwrap().action, RowAction::KeepLocal);
        assert_eq!(session.row(&id("c")).unwrap().action, RowAction::KeepRemote);
    }

    #[test]
    fn newest_priority_uses_minute_window() {
        let mut l = task("a", "Task", TaskStatus::NotStarted, None);
        let mut r = task("a", "Task", TaskStatus::Done, None);
        l.last_updated = at(1);
        r.last_updated = at(1) + chrono::Duration::seconds(40);

        let session = MergeSession::begin(doc(vec![l.clone()]), doc(vec![r.clone()]), Priority::Newest);
        assert_eq!(session.row(&id("a")).unwrap().action, RowAction::KeepLocal);

        r.last_updated = at(3);
        let session = MergeSession::begin(doc(vec![l]), doc(vec![r]), Priority::Newest);
        assert_eq!(session.row(&id("a")).unwrap().action, RowAction::KeepRemote);
    }

    #[test]
    fn remote_deadlines_keep_their_day_across_start_dates() {
        let mut local = doc(vec![task("a", "Plan", TaskStatus::NotStarted, None)]);
        local.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let mut remote = doc(vec![task("a", "Plan v2", TaskStatus::NotStarted, None)]);
        remote.start_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        remote.tasks[0].deadline = Some(Deadline::DayOffset(0));
        let mut extra = task("b", "Order tiles", TaskStatus::NotStarted, None);
        extra.deadline = Some(Deadline::DayOffset(5));
        remote.tasks.push(extra);
        let intended = Deadline::DayOffset(5).resolve(remote.start_date);

        let session = MergeSession::begin(local.clone(), remote.clone(), Priority::Remote);
        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(doc.start_date, local.start_date);
        assert_eq!(live(&doc, "a").deadline, Some(Deadline::DayOffset(31)));
        assert_eq!(live(&doc, "b").deadline, Some(Deadline::DayOffset(36)));
        assert_eq!(live(&doc, "b").deadline.unwrap().resolve(doc.start_date), intended);

        local.start_date = None;
        let session = MergeSession::begin(local, remote, Priority::Local);
        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "b").deadline, intended.map(Deadline::At));
    }

    #[test]
    fn matching_start_dates_keep_offsets_verbatim() {
        let mut local = doc(vec![task("a", "Plan", TaskStatus::NotStarted, None)]);
        local.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let mut remote = local.clone();
        let mut extra = task("b", "Order tiles", TaskStatus::NotStarted, None);
        extra.deadline = Some(Deadline::DayOffset(5));
        remote.tasks.push(extra);

        let doc = merged(MergeSession::begin(local, remote, Priority::Local).commit(at(5)).unwrap());
        assert_eq!(live(&doc, "b").deadline, Some(Deadline::DayOffset(5)));
    }

    #[test]
    fn duplicate_ids_in_an_input_are_rejected() {
        let (local, mut remote) = status_pair();
        remote.tasks.push(task("b", "Review again", TaskStatus::NotStarted, None));
        let session = MergeSession::begin(local, remote, Priority::Remote);

        assert_eq!(
            session.commit(at(5)),
            Err(MergeError::InvalidInput {
                side: "remote",
                source: ForestError::DuplicateId(id("b")),
            })
        );
    }

    #[test]
    fn one_sided_rows_default_to_keep_and_add() {
        let local = doc(vec![task("a", "Mine", TaskStatus::NotStarted, None)]);
        let remote = doc(vec![task("b", "Theirs", TaskStatus::NotStarted, None)]);
        let session = MergeSession::begin(local, remote, Priority::Local);

        let a = session.row(&id("a")).unwrap();
        assert_eq!((a.presence, a.action), (Presence::LocalOnly, RowAction::KeepLocal));
        let b = session.row(&id("b")).unwrap();
        assert_eq!((b.presence, b.action), (Presence::RemoteOnly, RowAction::AddRemote));

        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(doc.live_tasks().count(), 2);
    }

    #[test]
    fn tombstoned_rows_default_to_delete() {
        let mut gone = task("x", "Old", TaskStatus::NotStarted, None);
        gone.is_deleted = true;
        let local = doc(vec![gone]);
        let remote = doc(vec![task("x", "Old", TaskStatus::NotStarted, None)]);

        let session = MergeSession::begin(local, remote, Priority::Remote);
        let row = session.row(&id("x")).unwrap();
        assert!(row.tombstoned);
        assert_eq!(row.action, RowAction::Delete);

        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(doc.live_tasks().count(), 0);
        assert!(doc.task(&id("x")).unwrap().is_deleted);
    }

    #[test]
    fn deleted_rows_become_tombstones() {
        let (local, remote) = status_pair();
        let mut session = MergeSession::begin(local, remote, Priority::Local);
        session.resolve_row(&id("b"), RowAction::Delete).unwrap();

        let doc = merged(session.commit(at(5)).unwrap());
        let b = doc.task(&id("b")).unwrap();
        assert!(b.is_deleted);
        assert_eq!(doc.live_tasks().count(), 1);
    }

    #[test]
    fn duplicate_names_block_until_renamed() {
        let local = doc(vec![task("0", "Buy paint", TaskStatus::NotStarted, None)]);
        let remote = doc(vec![task("1", "Buy paint", TaskStatus::NotStarted, None)]);
        let mut session = MergeSession::begin(local, remote, Priority::Local);

        let err = session.commit(at(5)).unwrap_err();
        assert_eq!(
            err,
            MergeError::DuplicateNames(vec![DuplicateName {
                parent: None,
                name: "Buy paint".into(),
                ids: vec![id("0"), id("1")],
            }])
        );

        session.rename(&id("1"), "Buy paint (blue)").unwrap();
        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "1").name, "Buy paint (blue)");
        assert_eq!(live(&doc, "1").last_updated, at(5));
    }

    #[test]
    fn resurrection_keeps_both_and_children_follow_local_copy() {
        let local = doc(vec![
            task("0", "Plan", TaskStatus::NotStarted, None),
            task("1", "Draft", TaskStatus::InProgress, Some("0")),
        ]);
        let remote = doc(vec![task("0", "Plan v2", TaskStatus::NotStarted, None)]);
        let mut session = MergeSession::begin(local, remote, Priority::Local);
        session.resurrect(&id("0"), true).unwrap();

        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "0").name, "Plan v2");
        assert_eq!(live(&doc, "a").name, "Plan");
        assert_eq!(live(&doc, "1").parent_id, Some(id("a")));
        assert_eq!(live(&doc, "a").status, TaskStatus::InProgress);
    }

    #[test]
    fn resurrection_can_introduce_duplicates() {
        let local = doc(vec![task("0", "Plan", TaskStatus::InProgress, None)]);
        let remote = doc(vec![task("0", "Plan", TaskStatus::Done, None)]);
        let mut session = MergeSession::begin(local, remote, Priority::Local);
        session.resurrect(&id("0"), true).unwrap();

        assert!(matches!(
            session.commit(at(5)),
            Err(MergeError::DuplicateNames(_))
        ));

        session.rename(&id("0"), "Plan (remote)").unwrap();
        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "0").name, "Plan (remote)");
        assert_eq!(live(&doc, "0").status, TaskStatus::Done);
        assert_eq!(live(&doc, "a").name, "Plan");
    }

    #[test]
    fn invalid_overrides_rejected() {
        let local = doc(vec![task("0", "Mine", TaskStatus::NotStarted, None)]);
        let remote = doc(vec![task("1", "Theirs", TaskStatus::NotStarted, None)]);
        let mut session = MergeSession::begin(local, remote, Priority::Local);

        assert_eq!(
            session.resolve_row(&id("0"), RowAction::KeepRemote),
            Err(MergeError::InvalidAction {
                id: id("0"),
                action: RowAction::KeepRemote
            })
        );
        assert!(session.resolve_row(&id("1"), RowAction::KeepLocal).is_err());
        assert_eq!(
            session.resurrect(&id("0"), true),
            Err(MergeError::CannotResurrect(id("0")))
        );
        assert_eq!(
            session.resolve_row(&id("z"), RowAction::Delete),
            Err(MergeError::UnknownRow(id("z")))
        );
        assert_eq!(session.rename(&id("0"), "  "), Err(MergeError::EmptyName));
    }

    #[test]
    fn mixed_parents_forming_a_cycle_are_rejected() {
        let local = doc(vec![
            task("a", "A", TaskStatus::NotStarted, None),
            task("b", "B", TaskStatus::NotStarted, Some("a")),
        ]);
        let remote = doc(vec![
            task("a", "A", TaskStatus::NotStarted, Some("b")),
            task("b", "B", TaskStatus::NotStarted, None),
        ]);
        let mut session = MergeSession::begin(local, remote, Priority::Local);
        session.resolve_row(&id("a"), RowAction::KeepRemote).unwrap();

        assert!(matches!(
            session.commit(at(5)),
            Err(MergeError::Forest(ForestError::Cycle(_)))
        ));
    }

    #[test]
    fn deleted_parent_leaves_children_at_root() {
        let (local, remote) = status_pair();
        let mut session = MergeSession::begin(local, remote, Priority::Local);
        session.resolve_row(&id("a"), RowAction::Delete).unwrap();

        let doc = merged(session.commit(at(5)).unwrap());
        assert_eq!(live(&doc, "b").parent_id, None);
    }

    #[test]
    fn identical_ancestors_of_conflicts_stay_visible() {
        let local = doc(vec![
            task("a", "Top", TaskStatus::InProgress, None),
            task("b", "Same", TaskStatus::NotStarted, Some("a")),
            task("c", "Diff", TaskStatus::InProgress, Some("a")),
        ]);
        let mut remote = local.clone();
        remote.tasks[2].name = "Different".into();

        let session = MergeSession::begin(local, remote, Priority::Local);
        let visible: Vec<&str> = session.view().map(|r| r.id.as_str()).collect();
        assert_eq!(visible, vec!["a", "c"]);
    }

    #[test]
    fn day_offsets_compare_by_resolved_date() {
        let mut l = task("a", "Due", TaskStatus::NotStarted, None);
        l.deadline = Some(Deadline::DayOffset(2));
        let mut r = l.clone();
        r.deadline = Some(Deadline::At(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()));

        let mut local = doc(vec![l]);
        local.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let remote = doc(vec![r]);

        assert!(MergeSession::begin(local, remote, Priority::Local).is_noop());
    }

    #[test]
    fn same_choices_give_identical_output() {
        let (local, remote) = status_pair();
        let session = MergeSession::begin(local, remote, Priority::Remote);
        let first = merged(session.commit(at(5)).unwrap());
        let second = merged(session.commit(at(5)).unwrap());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn actions_parse_from_cli_names() {
        assert_eq!("keep-remote".parse::<RowAction>().unwrap(), RowAction::KeepRemote);
        assert_eq!("add_remote".parse::<RowAction>().unwrap(), RowAction::AddRemote);
        assert_eq!("Newest".parse::<Priority>().unwrap(), Priority::Newest);
        assert!("both".parse::<RowAction>().is_err());
    }
}
