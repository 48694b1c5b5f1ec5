//! Editing session over one project document
//!
//! Every mutation works on a copy of the task list, runs status propagation
//! and forest validation, and only then replaces the current document. A
//! rejected edit leaves the document and the history untouched.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::forest::{live_index, validate, ForestError, ForestGraph};
use super::history::History;
use super::id::{allocate_task_id, IdError, TaskId};
use super::reorder::{self, MoveTarget};
use super::status::{self, propagate};
use super::task::{Deadline, ProjectDocument, Task, TaskStatus};
use crate::codec::{self, CodecError, MappingRegistry};

#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("Task names must not be empty")]
    EmptyName,

    #[error("Status of {0} is derived from its subtasks; set it on the subtasks or use a parent status write")]
    DerivedStatus(TaskId),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error(transparent)]
    Forest(#[from] ForestError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn clean_name(name: &str) -> Result<String, EditError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EditError::EmptyName);
    }
    Ok(name.to_string())
}

/// A project document plus its undo history
#[derive(Debug, Clone)]
pub struct Editor {
    document: ProjectDocument,
    history: History<ProjectDocument>,
}

impl Editor {
    pub fn new(document: ProjectDocument) -> Self {
        Self::with_history_limit(document, History::<ProjectDocument>::DEFAULT_LIMIT)
    }

    pub fn with_history_limit(document: ProjectDocument, limit: usize) -> Self {
        Self {
            document,
            history: History::new(limit),
        }
    }

    /// Hydrates an editor from a shared token
    pub fn from_token(token: &str, registry: &MappingRegistry) -> Result<Self, EditError> {
        let document = codec::decode(token, registry)?;
        validate(&document.tasks)?;
        Ok(Self::new(document))
    }

    /// Current shareable token
    pub fn export_token(&self, registry: &MappingRegistry) -> Result<String, EditError> {
        Ok(codec::encode(&self.document, registry)?)
    }

    pub fn document(&self) -> &ProjectDocument {
        &self.document
    }

    pub fn into_document(self) -> ProjectDocument {
        self.document
    }

    fn apply<R>(
        &mut self,
        now: DateTime<Utc>,
        edit: impl FnOnce(&mut Vec<Task>) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        let mut tasks = self.document.tasks.clone();
        let result = edit(&mut tasks).inspect_err(|e| warn!(error = %e, "edit rejected"))?;
        propagate(&mut tasks, now)?;
        validate(&tasks)?;

        let next = ProjectDocument {
            tasks,
            ..self.document.clone()
        };
        let previous = std::mem::replace(&mut self.document, next);
        self.history.push(previous);
        Ok(result)
    }

    /// Adds a task as the last child of `parent` (or as the last root)
    pub fn add_task(
        &mut self,
        name: &str,
        parent: Option<&TaskId>,
        now: DateTime<Utc>,
    ) -> Result<TaskId, EditError> {
        let name = clean_name(name)?;
        let id = allocate_task_id(self.document.tasks.iter().map(|t| &t.id))?;
        let parent = parent.cloned();

        let new_id = id.clone();
        self.apply(now, move |tasks| {
            if let Some(p) = &parent {
                live_index(tasks, p)?;
            }
            let order = tasks
                .iter()
                .filter(|t| t.is_live() && t.parent_id == parent)
                .map(|t| t.order)
                .max()
                .unwrap_or(0)
                + 1;

            let mut task = Task::new(new_id, name, now).with_order(order);
            task.parent_id = parent;
            tasks.push(task);
            Ok(())
        })?;

        debug!(task = %id, "task added");
        Ok(id)
    }

    pub fn rename(&mut self, id: &TaskId, name: &str, now: DateTime<Utc>) -> Result<(), EditError> {
        let name = clean_name(name)?;
        self.apply(now, |tasks| {
            let idx = live_index(tasks, id)?;
            if tasks[idx].name != name {
                tasks[idx].name = name;
                tasks[idx].touch(now);
            }
            Ok(())
        })
    }

    /// Sets the status of a leaf task
    pub fn set_status(
        &mut self,
        id: &TaskId,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), EditError> {
        self.apply(now, |tasks| {
            let idx = live_index(tasks, id)?;
            if !ForestGraph::from_tasks(tasks).children(id).is_empty() {
                return Err(EditError::DerivedStatus(id.clone()));
            }
            if tasks[idx].status != status {
                tasks[idx].status = status;
                tasks[idx].touch(now);
            }
            Ok(())
        })
    }

    /// Writes a status on a task and cascades it into its subtree
    pub fn set_parent_status(
        &mut self,
        id: &TaskId,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<usize, EditError> {
        self.apply(now, |tasks| Ok(status::set_parent_status(tasks, id, status, now)?))
    }

    pub fn set_deadline(
        &mut self,
        id: &TaskId,
        deadline: Option<Deadline>,
        now: DateTime<Utc>,
    ) -> Result<(), EditError> {
        self.apply(now, |tasks| {
            let idx = live_index(tasks, id)?;
            if tasks[idx].deadline != deadline {
                tasks[idx].deadline = deadline;
                tasks[idx].touch(now);
            }
            Ok(())
        })
    }

    pub fn move_task(
        &mut self,
        id: &TaskId,
        target: &MoveTarget,
        now: DateTime<Utc>,
    ) -> Result<(), EditError> {
        self.apply(now, |tasks| Ok(reorder::move_task(tasks, id, target, now)?))
    }

    pub fn reorder_roots(&mut self, ordered: &[TaskId], now: DateTime<Utc>) -> Result<(), EditError> {
        self.apply(now, |tasks| Ok(reorder::reorder_roots(tasks, ordered, now)?))
    }

    /// Tombstones a task and every live descendant; returns how many were deleted
    pub fn delete_subtree(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<usize, EditError> {
        self.apply(now, |tasks| {
            live_index(tasks, id)?;
            let mut doomed = ForestGraph::from_tasks(tasks).descendants(id);
            doomed.push(id.clone());

            let mut count = 0;
            for task in tasks.iter_mut().filter(|t| t.is_live()) {
                if doomed.contains(&task.id) {
                    task.is_deleted = true;
                    task.touch(now);
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    pub fn rename_project(&mut self, name: &str) -> Result<(), EditError> {
        let name = clean_name(name)?;
        let mut next = self.document.clone();
        next.project_name = name;
        let previous = std::mem::replace(&mut self.document, next);
        self.history.push(previous);
        Ok(())
    }

    pub fn set_start_date(&mut self, start: Option<NaiveDate>) {
        let mut next = self.document.clone();
        next.start_date = start;
        let previous = std::mem::replace(&mut self.document, next);
        self.history.push(previous);
    }

    pub fn undo(&mut self) -> Result<(), EditError> {
        let current = self.document.clone();
        match self.history.undo(current) {
            Ok(previous) => {
                self.document = previous;
                Ok(())
            }
            Err(_) => Err(EditError::NothingToUndo),
        }
    }

    pub fn redo(&mut self) -> Result<(), EditError> {
        let current = self.document.clone();
        match self.history.redo(current) {
            Ok(next) => {
                self.document = next;
                Ok(())
            }
            Err(_) => Err(EditError::NothingToRedo),
        }
    }
}
