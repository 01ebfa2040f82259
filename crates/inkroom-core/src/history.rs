//! Local undo/redo of surface snapshots.
//!
//! History belongs to one client and is never sent to peers. Undoing only
//! changes what this client sees; the shared stroke log is untouched.

use crate::surface::{Snapshot, SurfaceResult};
use image::RgbaImage;

/// Two-stack snapshot history.
///
/// The undo stack always holds at least the baseline snapshot; its top is
/// the state currently shown.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    /// Bumped whenever a new baseline or snapshot invalidates queued restores.
    generation: u64,
}

/// A restore that has been requested but whose snapshot is not decoded yet.
#[derive(Debug, Clone)]
pub struct PendingRestore {
    snapshot: Snapshot,
    generation: u64,
}

impl PendingRestore {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Decode the target snapshot.
    pub fn decode(&self) -> SurfaceResult<RgbaImage> {
        self.snapshot.decode()
    }
}

impl History {
    /// Start a history whose baseline is `initial`.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            undo_stack: vec![initial],
            redo_stack: Vec::new(),
            generation: 0,
        }
    }

    /// Push a new snapshot (call after each completed local change).
    pub fn record(&mut self, snapshot: Snapshot) {
        self.undo_stack.push(snapshot);
        // New changes invalidate anything that was undone.
        self.redo_stack.clear();
        self.generation += 1;
    }

    /// Drop all history and start again from `baseline`.
    pub fn reset(&mut self, baseline: Snapshot) {
        self.undo_stack.clear();
        self.undo_stack.push(baseline);
        self.redo_stack.clear();
        self.generation += 1;
    }

    /// Step back one snapshot.
    /// Returns the restore to apply, or `None` if only the baseline is left.
    pub fn undo(&mut self) -> Option<PendingRestore> {
        if self.undo_stack.len() <= 1 {
            return None;
        }
        let undone = self.undo_stack.pop()?;
        self.redo_stack.push(undone);
        self.undo_stack.last().cloned().map(|snapshot| self.pending(snapshot))
    }

    /// Step forward one snapshot.
    /// Returns the restore to apply, or `None` if nothing was undone.
    pub fn redo(&mut self) -> Option<PendingRestore> {
        let snapshot = self.redo_stack.pop()?;
        self.undo_stack.push(snapshot.clone());
        Some(self.pending(snapshot))
    }

    /// Whether `restore` still targets this history's timeline.
    pub fn is_current(&self, restore: &PendingRestore) -> bool {
        restore.generation == self.generation
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of snapshots on the undo stack, baseline included.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// The snapshot currently shown.
    pub fn current(&self) -> Option<&Snapshot> {
        self.undo_stack.last()
    }

    fn pending(&self, snapshot: Snapshot) -> PendingRestore {
        PendingRestore {
            snapshot,
            generation: self.generation,
        }
    }
}
