//! Domain models for taskforest
//!
//! Contains the task forest, its invariants and every algorithm over it,
//! without any I/O concerns.

mod editor;
mod forest;
mod history;
mod id;
mod merge;
mod reorder;
mod status;
mod task;

pub use editor::{EditError, Editor};
pub use forest::{
    clear_orphans, is_ancestor, sibling_name_groups, validate, ForestError, ForestGraph,
};
pub use history::History;
pub use id::{
    allocate_task_id, render_base36, render_base64, IdError, MemorySequence, ProjectId,
    ProjectIdAllocator, ResurrectionAllocator, SequenceSource, TaskId, ALPHABET_64,
};
pub use merge::{
    DuplicateName, MergeError, MergeOutcome, MergeRow, MergeSession, Presence, Priority,
    RowAction,
};
pub use reorder::{insertion_index, move_task, reorder_roots, MoveTarget};
pub use status::{derive_status, propagate, set_parent_status};
pub use task::{Deadline, ProjectDocument, SharingRecord, StatusError, Task, TaskStatus};
