//! Undo and redo for queue edits made by a controller.

use log::debug;

use crate::error::QueueError;
use crate::item::{ItemId, QueueItem};
use crate::queue::{Queue, Relocation, Removal};

/// A change that was applied to the queue
#[derive(Debug, Clone)]
enum Edit {
    /// Items now sitting at these positions were inserted
    Inserted(Vec<(usize, QueueItem)>),
    /// Items were removed from these positions
    Removed(Vec<(usize, QueueItem)>),
    Moved(Vec<Relocation>),
}

fn split(entries: Vec<(usize, QueueItem)>) -> (Vec<usize>, Vec<QueueItem>) {
    entries.into_iter().unzip()
}

fn positions(entries: &[(usize, QueueItem)]) -> Vec<usize> {
    entries.iter().map(|(position, _)| *position).collect()
}

/// Records the inverse of each edit so it can be undone and redone
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Edit>,
    redo: Vec<Edit>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    fn record(&mut self, edit: Edit) {
        self.undo.push(edit);
        self.redo.clear();
    }

    pub fn insert(&mut self, queue: &Queue, items: Vec<QueueItem>, at: &[usize]) -> Result<(), QueueError> {
        let entries: Vec<(usize, QueueItem)> = at.iter().copied().zip(items.iter().cloned()).collect();
        queue.insert(items, at)?;
        self.record(Edit::Inserted(entries));
        Ok(())
    }

    pub fn remove(&mut self, queue: &Queue, at: &[usize]) -> Result<Removal, QueueError> {
        let removal = queue.remove(at)?;
        if !removal.removed.is_empty() {
            self.record(Edit::Removed(removal.removed.clone()));
        }
        Ok(removal)
    }

    pub fn move_items(&mut self, queue: &Queue, ids: &[ItemId], to: usize) -> Result<Vec<Relocation>, QueueError> {
        let moves = queue.move_items(ids, to)?;
        self.record(Edit::Moved(moves.clone()));
        Ok(moves)
    }

    /// Start the queue. Edits made before a run are no longer undoable.
    pub fn start(&mut self, queue: &Queue) -> bool {
        self.clear();
        queue.start()
    }

    /// Revert the latest edit. Returns false when there is nothing to undo.
    pub fn undo(&mut self, queue: &Queue) -> Result<bool, QueueError> {
        let Some(edit) = self.undo.pop() else {
            return Ok(false);
        };
        match revert(queue, &edit) {
            Ok(inverse) => {
                debug!("Undid {}", kind(&edit));
                self.redo.push(inverse);
                Ok(true)
            }
            Err(e) => {
                self.undo.push(edit);
                Err(e)
            }
        }
    }

    /// Re-apply the latest undone edit. Returns false when there is nothing to redo.
    pub fn redo(&mut self, queue: &Queue) -> Result<bool, QueueError> {
        let Some(edit) = self.redo.pop() else {
            return Ok(false);
        };
        match revert(queue, &edit) {
            Ok(inverse) => {
                debug!("Redid {}", kind(&edit));
                self.undo.push(inverse);
                Ok(true)
            }
            Err(e) => {
                self.redo.push(edit);
                Err(e)
            }
        }
    }
}

fn kind(edit: &Edit) -> &'static str {
    match edit {
        Edit::Inserted(_) => "insert",
        Edit::Removed(_) => "remove",
        Edit::Moved(_) => "move",
    }
}

/// Apply the inverse of `edit` and describe what was done, so it can be reverted in turn
fn revert(queue: &Queue, edit: &Edit) -> Result<Edit, QueueError> {
    match edit {
        Edit::Inserted(entries) => {
            let removal = queue.remove(&positions(entries))?;
            Ok(Edit::Removed(removal.removed))
        }
        Edit::Removed(entries) => {
            let (at, items) = split(entries.clone());
            queue.insert(items, &at)?;
            Ok(Edit::Inserted(entries.clone()))
        }
        Edit::Moved(moves) => {
            let inverse: Vec<Relocation> = moves.iter().rev().map(|m| m.inverse()).collect();
            let applied = queue.relocate(&inverse)?;
            Ok(Edit::Moved(applied))
        }
    }
}
