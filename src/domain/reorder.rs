//! Moving and reordering tasks
//!
//! Sibling `order` values are renumbered 1-based and contiguous after every
//! move. Screen geometry stays with the caller: root reordering takes the
//! final ordered list of root ids, and [`insertion_index`] is the only
//! geometric helper.

use chrono::{DateTime, Utc};

use super::forest::{is_ancestor, live_index, ForestError};
use super::id::TaskId;
use super::task::Task;

/// Where a moved task should land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTarget {
    /// New parent; `None` moves the task to the root level
    pub parent: Option<TaskId>,
    /// Position among the new siblings (clamped to the end)
    pub index: usize,
}

impl MoveTarget {
    pub fn under(parent: TaskId, index: usize) -> Self {
        Self {
            parent: Some(parent),
            index,
        }
    }

    pub fn root(index: usize) -> Self {
        Self {
            parent: None,
            index,
        }
    }
}

/// Live siblings under `parent`, in current display order
fn sibling_indices(tasks: &[Task], parent: Option<&TaskId>) -> Vec<usize> {
    let mut siblings: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_live() && t.parent_id.as_ref() == parent)
        .map(|(i, _)| i)
        .collect();
    siblings.sort_by(|&a, &b| {
        tasks[a]
            .order
            .cmp(&tasks[b].order)
            .then_with(|| tasks[a].id.cmp(&tasks[b].id))
    });
    siblings
}

fn renumber(tasks: &mut [Task], ordered: &[usize], now: DateTime<Utc>) {
    for (position, &idx) in ordered.iter().enumerate() {
        let order = position as i64 + 1;
        if tasks[idx].order != order {
            tasks[idx].order = order;
            tasks[idx].touch(now);
        }
    }
}

/// Moves a task to a new position, optionally under a new parent
///
/// Rejected moves (self-parenting, cycles, sibling name clashes) leave the
/// tasks untouched.
pub fn move_task(
    tasks: &mut [Task],
    id: &TaskId,
    target: &MoveTarget,
    now: DateTime<Utc>,
) -> Result<(), ForestError> {
    let moved = live_index(tasks, id)?;

    if let Some(parent) = &target.parent {
        if parent == id {
            return Err(ForestError::SelfParent(id.clone()));
        }
        live_index(tasks, parent)?;
        if is_ancestor(tasks, id, parent) {
            return Err(ForestError::WouldCycle {
                task: id.clone(),
                parent: parent.clone(),
            });
        }
    }

    let name = &tasks[moved].name;
    let clash = tasks.iter().any(|t| {
        t.is_live() && &t.id != id && t.parent_id == target.parent && &t.name == name
    });
    if clash {
        return Err(ForestError::DuplicateName {
            parent: target.parent.clone(),
            name: name.clone(),
        });
    }

    let old_parent = tasks[moved].parent_id.clone();
    tasks[moved].parent_id = target.parent.clone();

    let mut siblings: Vec<usize> = sibling_indices(tasks, target.parent.as_ref())
        .into_iter()
        .filter(|&i| i != moved)
        .collect();
    siblings.insert(target.index.min(siblings.len()), moved);
    renumber(tasks, &siblings, now);

    if old_parent != target.parent {
        let left_behind = sibling_indices(tasks, old_parent.as_ref());
        renumber(tasks, &left_behind, now);
    }

    tasks[moved].touch(now);
    Ok(())
}

/// Renumbers root tasks from an ordered list of root ids
///
/// Roots missing from `ordered` keep their relative order after the listed ones.
pub fn reorder_roots(
    tasks: &mut [Task],
    ordered: &[TaskId],
    now: DateTime<Utc>,
) -> Result<(), ForestError> {
    let mut sequence = Vec::with_capacity(ordered.len());
    for id in ordered {
        let idx = live_index(tasks, id)?;
        if tasks[idx].parent_id.is_some() {
            return Err(ForestError::NotARoot(id.clone()));
        }
        if !sequence.contains(&idx) {
            sequence.push(idx);
        }
    }

    for idx in sibling_indices(tasks, None) {
        if !sequence.contains(&idx) {
            sequence.push(idx);
        }
    }

    renumber(tasks, &sequence, now);
    Ok(())
}

/// Slot index for a horizontal anchor given the on-screen centers of the
/// existing slots, left to right
pub fn insertion_index(anchor: f64, centers: &[f64]) -> usize {
    centers.iter().take_while(|&&center| center < anchor).count()
}
