//! Undo/Redo history
//!
//! Each recorded change keeps the complete engine state before and after
//! it, so undoing is a plain restore with no inverse operations to get
//! wrong.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::EngineState;
use crate::error::{ForgeError, Result};

/// A single undoable change with complete state snapshots.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,

    /// Human-readable description, e.g. the operation name.
    pub description: String,

    pub timestamp: DateTime<Utc>,

    pub state_before: EngineState,

    pub state_after: EngineState,
}

impl HistoryEntry {
    pub fn new(
        description: impl Into<String>,
        state_before: EngineState,
        state_after: EngineState,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            timestamp: Utc::now(),
            state_before,
            state_after,
        }
    }
}

/// Bounded undo and redo stacks.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    limit: usize,
    discarded_ids: Vec<String>,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit,
            discarded_ids: Vec::new(),
        }
    }

    /// Record a change. Clears the redo stack, since history has diverged,
    /// and drops the oldest entries past the limit.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo_stack.clear();
        self.undo_stack.push(entry);
        self.trim();
    }

    /// Pop the last change. The caller restores `state_before`.
    pub fn undo(&mut self) -> Result<HistoryEntry> {
        let entry = self.undo_stack.pop().ok_or(ForgeError::NothingToUndo)?;
        self.redo_stack.push(entry.clone());
        Ok(entry)
    }

    /// Pop the last undone change. The caller restores `state_after`.
    pub fn redo(&mut self) -> Result<HistoryEntry> {
        let entry = self.redo_stack.pop().ok_or(ForgeError::NothingToRedo)?;
        self.undo_stack.push(entry.clone());
        Ok(entry)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.undo_stack.last()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// IDs of entries dropped because the history was over its limit.
    pub fn discarded_ids(&self) -> &[String] {
        &self.discarded_ids
    }

    pub fn clear(&mut self) {
        let dropped = self.undo_stack.drain(..).chain(self.redo_stack.drain(..));
        self.discarded_ids.extend(dropped.map(|e| e.id));
    }

    fn trim(&mut self) {
        if self.undo_stack.len() > self.limit {
            let excess = self.undo_stack.len() - self.limit;
            self.discarded_ids
                .extend(self.undo_stack.drain(..excess).map(|e| e.id));
        }
    }
}
