//! Task forest structure and invariants
//!
//! The forest is the set of non-deleted tasks related by `parent_id`.
//! Uses petgraph for cycle detection and subtree walks.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use thiserror::Error;

use super::id::TaskId;
use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task is deleted: {0}")]
    TaskDeleted(TaskId),

    #[error("Duplicate task ID: {0}")]
    DuplicateId(TaskId),

    #[error("Task {task} refers to missing or deleted parent {parent}")]
    OrphanParent { task: TaskId, parent: TaskId },

    #[error("Duplicate name '{name}' under {}", parent_label(.parent))]
    DuplicateName { parent: Option<TaskId>, name: String },

    #[error("Task names must not be empty")]
    EmptyName,

    #[error("Parent chain contains a cycle through {0}")]
    Cycle(TaskId),

    #[error("Task cannot be its own parent: {0}")]
    SelfParent(TaskId),

    #[error("Moving {task} under {parent} would create a cycle")]
    WouldCycle { task: TaskId, parent: TaskId },

    #[error("Task is not a root: {0}")]
    NotARoot(TaskId),

    #[error("Status propagation did not settle after {passes} passes")]
    PropagationDiverged { passes: usize },
}

fn parent_label(parent: &Option<TaskId>) -> String {
    match parent {
        Some(id) => format!("parent {}", id),
        None => "the root".to_string(),
    }
}

/// Parent→child graph over the live tasks of a document
#[derive(Debug, Default)]
pub struct ForestGraph {
    graph: DiGraph<TaskId, ()>,
    node_map: HashMap<TaskId, NodeIndex>,
}

impl ForestGraph {
    /// Builds the graph from live tasks. Edges to missing parents are skipped.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for task in tasks.iter().filter(|t| t.is_live()) {
            node_map
                .entry(task.id.clone())
                .or_insert_with(|| graph.add_node(task.id.clone()));
        }

        for task in tasks.iter().filter(|t| t.is_live()) {
            let Some(parent) = &task.parent_id else {
                continue;
            };
            if let (Some(&p), Some(&c)) = (node_map.get(parent), node_map.get(&task.id)) {
                graph.add_edge(p, c, ());
            }
        }

        Self { graph, node_map }
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Returns a task on a cycle, if the parent graph has one
    pub fn find_cycle(&self) -> Option<TaskId> {
        toposort(&self.graph, None)
            .err()
            .map(|cycle| self.graph[cycle.node_id()].clone())
    }

    /// Returns the direct live children of a task
    pub fn children(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&idx) = self.node_map.get(id) else {
            return vec![];
        };
        let mut children: Vec<TaskId> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect();
        children.sort();
        children
    }

    /// Returns every live descendant of a task, excluding the task itself
    pub fn descendants(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&start) = self.node_map.get(id) else {
            return vec![];
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut found = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                found.push(self.graph[node].clone());
            }
        }
        found.sort();
        found
    }
}

/// Checks every forest invariant
///
/// Ids are unique across all tasks; live tasks have non-empty names, live
/// parents, unique names among siblings, and no cycles.
pub fn validate(tasks: &[Task]) -> Result<(), ForestError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(ForestError::DuplicateId(task.id.clone()));
        }
    }

    let live: HashSet<&TaskId> = tasks.iter().filter(|t| t.is_live()).map(|t| &t.id).collect();
    for task in tasks.iter().filter(|t| t.is_live()) {
        if task.name.trim().is_empty() {
            return Err(ForestError::EmptyName);
        }
        if let Some(parent) = &task.parent_id {
            if parent == &task.id {
                return Err(ForestError::SelfParent(task.id.clone()));
            }
            if !live.contains(parent) {
                return Err(ForestError::OrphanParent {
                    task: task.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    if let Some((parent, name)) = find_name_collision(tasks) {
        return Err(ForestError::DuplicateName { parent, name });
    }

    if let Some(id) = ForestGraph::from_tasks(tasks).find_cycle() {
        return Err(ForestError::Cycle(id));
    }

    Ok(())
}

/// Groups live task ids by (parent, name); groups with more than one entry collide
pub fn sibling_name_groups(tasks: &[Task]) -> BTreeMap<(Option<TaskId>, String), Vec<TaskId>> {
    let mut groups: BTreeMap<(Option<TaskId>, String), Vec<TaskId>> = BTreeMap::new();
    for task in tasks.iter().filter(|t| t.is_live()) {
        groups
            .entry((task.parent_id.clone(), task.name.clone()))
            .or_default()
            .push(task.id.clone());
    }
    groups.retain(|_, ids| ids.len() > 1);
    groups
}

fn find_name_collision(tasks: &[Task]) -> Option<(Option<TaskId>, String)> {
    sibling_name_groups(tasks).into_keys().next()
}

/// Index of the live task with the given id
pub fn live_index(tasks: &[Task], id: &TaskId) -> Result<usize, ForestError> {
    match tasks.iter().position(|t| &t.id == id) {
        Some(idx) if tasks[idx].is_live() => Ok(idx),
        Some(_) => Err(ForestError::TaskDeleted(id.clone())),
        None => Err(ForestError::TaskNotFound(id.clone())),
    }
}

/// Returns true if `ancestor` appears on the parent chain above `id`
///
/// The walk is bounded by the task count so malformed cyclic input terminates.
pub fn is_ancestor(tasks: &[Task], ancestor: &TaskId, id: &TaskId) -> bool {
    let parents: HashMap<&TaskId, Option<&TaskId>> = tasks
        .iter()
        .filter(|t| t.is_live())
        .map(|t| (&t.id, t.parent_id.as_ref()))
        .collect();

    let mut current = parents.get(id).copied().flatten();
    for _ in 0..=parents.len() {
        match current {
            Some(p) if p == ancestor => return true,
            Some(p) => current = parents.get(p).copied().flatten(),
            None => return false,
        }
    }
    // Only reachable on a cycle that does not include `ancestor`.
    false
}

/// Clears parent references that do not point at a live task
///
/// Returns the ids of the tasks that were moved to the root.
pub fn clear_orphans(tasks: &mut [Task]) -> Vec<TaskId> {
    let live: HashSet<TaskId> = tasks
        .iter()
        .filter(|t| t.is_live())
        .map(|t| t.id.clone())
        .collect();

    let mut cleared = Vec::new();
    for task in tasks.iter_mut().filter(|t| t.is_live()) {
        if let Some(parent) = &task.parent_id {
            if !live.contains(parent) || parent == &task.id {
                task.parent_id = None;
                cleared.push(task.id.clone());
            }
        }
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn task(i: &str, name: &str, parent: Option<&str>) -> Task {
        let mut t = Task::new(id(i), name, Utc::now());
        t.parent_id = parent.map(id);
        t
    }

    #[test]
    fn valid_forest_passes() {
        let tasks = vec![
            task("a", "Root", None),
            task("b", "Child", Some("a")),
            task("c", "Child", None),
        ];
        assert_eq!(validate(&tasks), Ok(()));
    }

    #[test]
    fn duplicate_ids_rejected_even_for_tombstones() {
        let mut dead = task("a", "Old", None);
        dead.is_deleted = true;
        let tasks = vec![task("a", "Root", None), dead];
        assert_eq!(validate(&tasks), Err(ForestError::DuplicateId(id("a"))));
    }

    #[test]
    fn orphan_parent_rejected() {
        let tasks = vec![task("b", "Child", Some("zz"))];
        assert!(matches!(
            validate(&tasks),
            Err(ForestError::OrphanParent { .. })
        ));
    }

    #[test]
    fn deleted_parent_counts_as_orphan() {
        let mut parent = task("a", "Root", None);
        parent.is_deleted = true;
        let tasks = vec![parent, task("b", "Child", Some("a"))];
        assert!(matches!(
            validate(&tasks),
            Err(ForestError::OrphanParent { .. })
        ));
    }

    #[test]
    fn sibling_name_collision_rejected() {
        let tasks = vec![
            task("a", "Root", None),
            task("b", "Same", Some("a")),
            task("c", "Same", Some("a")),
        ];
        assert_eq!(
            validate(&tasks),
            Err(ForestError::DuplicateName {
                parent: Some(id("a")),
                name: "Same".to_string()
            })
        );
    }

    #[test]
    fn deleted_siblings_do_not_collide() {
        let mut dead = task("c", "Same", None);
        dead.is_deleted = true;
        let tasks = vec![task("b", "Same", None), dead];
        assert_eq!(validate(&tasks), Ok(()));
    }

    #[test]
    fn cycle_detected() {
        let tasks = vec![task("a", "A", Some("b")), task("b", "B", Some("a"))];
        assert!(matches!(validate(&tasks), Err(ForestError::Cycle(_))));
    }

    #[test]
    fn descendants_and_children() {
        let tasks = vec![
            task("a", "A", None),
            task("b", "B", Some("a")),
            task("c", "C", Some("b")),
            task("d", "D", Some("a")),
        ];
        let graph = ForestGraph::from_tasks(&tasks);

        assert_eq!(graph.children(&id("a")), vec![id("b"), id("d")]);
        assert_eq!(graph.descendants(&id("a")), vec![id("b"), id("c"), id("d")]);
        assert!(graph.descendants(&id("c")).is_empty());
    }

    #[test]
    fn ancestor_walk() {
        let tasks = vec![
            task("a", "A", None),
            task("b", "B", Some("a")),
            task("c", "C", Some("b")),
        ];
        assert!(is_ancestor(&tasks, &id("a"), &id("c")));
        assert!(!is_ancestor(&tasks, &id("c"), &id("a")));
    }

    #[test]
    fn ancestor_walk_terminates_on_cycle() {
        let tasks = vec![
            task("a", "A", Some("b")),
            task("b", "B", Some("a")),
            task("c", "C", None),
        ];
        assert!(!is_ancestor(&tasks, &id("c"), &id("a")));
    }

    #[test]
    fn orphans_cleared_to_root() {
        let mut tasks = vec![task("a", "A", None), task("b", "B", Some("gone"))];
        let cleared = clear_orphans(&mut tasks);

        assert_eq!(cleared, vec![id("b")]);
        assert_eq!(tasks[1].parent_id, None);
    }
}
