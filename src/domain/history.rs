//! Bounded undo/redo history of immutable snapshots

use std::collections::VecDeque;

/// Undo and redo stacks; pushing a new state clears redo
#[derive(Debug, Clone)]
pub struct History<T> {
    undo: VecDeque<T>,
    redo: Vec<T>,
    limit: usize,
}

impl<T> History<T> {
    /// Default number of snapshots kept
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records the state that is about to be replaced
    pub fn push(&mut self, previous: T) {
        if self.limit == 0 {
            return;
        }
        if self.undo.len() == self.limit {
            self.undo.pop_front();
        }
        self.undo.push_back(previous);
        self.redo.clear();
    }

    /// Steps back: returns the previous state and stores `current` for redo
    pub fn undo(&mut self, current: T) -> Result<T, T> {
        match self.undo.pop_back() {
            Some(previous) => {
                self.redo.push(current);
                Ok(previous)
            }
            None => Err(current),
        }
    }

    /// Steps forward again after an undo
    pub fn redo(&mut self, current: T) -> Result<T, T> {
        match self.redo.pop() {
            Some(next) => {
                self.undo.push_back(current);
                Ok(next)
            }
            None => Err(current),
        }
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}
