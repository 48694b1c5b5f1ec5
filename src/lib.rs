//! taskforest - hierarchical task lists that travel as a single token
//!
//! A project is a forest of tasks. Its whole state encodes to one URL-safe
//! token, and two independently edited copies of a project can be merged
//! row by row without a central server.

pub mod cli;
pub mod codec;
pub mod domain;
pub mod storage;

pub use codec::{CodecError, MappingRegistry};
pub use domain::{
    Editor, MergeOutcome, MergeSession, Priority, ProjectDocument, ProjectId, Task, TaskId,
    TaskStatus,
};
