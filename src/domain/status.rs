//! Parent status propagation
//!
//! A task with live children takes its status from them; leaves keep the
//! status set on them. [`propagate`] recomputes parents until nothing changes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::forest::{live_index, ForestError, ForestGraph};
use super::id::TaskId;
use super::task::{Task, TaskStatus};

/// Aggregate status of a parent given its direct children
///
/// Returns `None` when there are no children.
pub fn derive_status(children: &[TaskStatus]) -> Option<TaskStatus> {
    if children.is_empty() {
        return None;
    }

    let status = if children.iter().all(|s| *s == TaskStatus::Done) {
        TaskStatus::Done
    } else if children
        .iter()
        .all(|s| matches!(s, TaskStatus::Done | TaskStatus::Suspended))
    {
        TaskStatus::Suspended
    } else if children.contains(&TaskStatus::InProgress) {
        TaskStatus::InProgress
    } else {
        TaskStatus::NotStarted
    };

    Some(status)
}

/// Recomputes parent statuses to a fixed point
///
/// Every changed task gets `last_updated = now`. Returns the number of status
/// changes. Passes are capped at `tasks.len() + 1`; running out means the
/// parent graph is cyclic.
pub fn propagate(tasks: &mut [Task], now: DateTime<Utc>) -> Result<usize, ForestError> {
    let index: HashMap<&TaskId, usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_live())
        .map(|(i, t)| (&t.id, i))
        .collect();

    // parent index -> child indices, ordered by parent index for determinism
    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, task) in tasks.iter().enumerate().filter(|(_, t)| t.is_live()) {
        if let Some(&p) = task.parent_id.as_ref().and_then(|p| index.get(p)) {
            if p != i {
                children.entry(p).or_default().push(i);
            }
        }
    }

    let max_passes = tasks.len() + 1;
    let mut changes = 0;

    for _ in 0..max_passes {
        let mut changed = false;

        for (&parent, kids) in &children {
            let statuses: Vec<TaskStatus> = kids.iter().map(|&k| tasks[k].status).collect();
            if let Some(derived) = derive_status(&statuses) {
                if tasks[parent].status != derived {
                    tasks[parent].status = derived;
                    tasks[parent].touch(now);
                    changes += 1;
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(changes);
        }
    }

    Err(ForestError::PropagationDiverged { passes: max_passes })
}

/// User-facing status write on a (possibly parent) task
///
/// - `Done` forces every live descendant to `Done`.
/// - `NotStarted` / `InProgress` overwrite descendants that are neither
///   `Done` nor `Suspended`.
/// - `Suspended` overwrites descendants that are not `Done`.
///
/// Propagation runs afterwards, so the target may settle on a different
/// status than the one written. Returns the number of tasks touched.
pub fn set_parent_status(
    tasks: &mut [Task],
    id: &TaskId,
    status: TaskStatus,
    now: DateTime<Utc>,
) -> Result<usize, ForestError> {
    let target = live_index(tasks, id)?;
    let descendants = ForestGraph::from_tasks(tasks).descendants(id);

    let mut touched = 0;
    for task in tasks
        .iter_mut()
        .filter(|t| t.is_live() && descendants.binary_search(&t.id).is_ok())
    {
        let overwrite = match status {
            TaskStatus::Done => true,
            TaskStatus::NotStarted | TaskStatus::InProgress => {
                !matches!(task.status, TaskStatus::Done | TaskStatus::Suspended)
            }
            TaskStatus::Suspended => task.status != TaskStatus::Done,
        };
        if overwrite && task.status != status {
            task.status = status;
            task.touch(now);
            touched += 1;
        }
    }

    if tasks[target].status != status {
        tasks[target].status = status;
        tasks[target].touch(now);
        touched += 1;
    }

    propagate(tasks, now)?;
    Ok(touched)
}
