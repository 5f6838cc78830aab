//! Undo/redo history over pipeline content.
//!
//! The history is a list of [`Snapshot`]s with a cursor. Recording
//! appends a snapshot after the cursor (discarding any redo tail),
//! undo and redo move the cursor and overwrite the live pipeline's
//! content in place. A separate saved-state snapshot backs dirty
//! tracking: the session is dirty exactly when the content at the
//! cursor differs from what was last saved.
//!
//! Only stage content is captured. View state, preview quality, and
//! cached results ride along untouched, so undoing an edit keeps the
//! user's zoom where it was.

use crate::pipeline::Pipeline;
use crate::stage::Stage;

/// An immutable copy of a pipeline's stage list.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    stages: Vec<Stage>,
}

impl Snapshot {
    /// Capture the pipeline's current content.
    #[must_use]
    pub fn of(pipeline: &Pipeline) -> Self {
        Self {
            stages: pipeline.stages().to_vec(),
        }
    }

    /// Whether the pipeline's content equals this snapshot.
    #[must_use]
    pub fn matches(&self, pipeline: &Pipeline) -> bool {
        self.stages == pipeline.stages()
    }

    /// Overwrite the pipeline's content with this snapshot. Does
    /// nothing when the content already matches, so no revision is
    /// burned.
    fn restore(&self, pipeline: &mut Pipeline) {
        if !self.matches(pipeline) {
            pipeline.set_stages(self.stages.clone());
        }
    }
}

/// Undo/redo entries, a cursor, and the last saved state.
#[derive(Debug)]
pub struct History {
    entries: Vec<Snapshot>,
    index: usize,
    saved: Snapshot,
}

impl History {
    /// A history whose single entry and saved state are the pipeline's
    /// current content.
    #[must_use]
    pub fn new(pipeline: &Pipeline) -> Self {
        let initial = Snapshot::of(pipeline);
        Self {
            entries: vec![initial.clone()],
            index: 0,
            saved: initial,
        }
    }

    /// Record the pipeline's content as a new entry.
    ///
    /// Returns `false` without touching the history when the content
    /// matches the entry at the cursor. Otherwise any entries after the
    /// cursor are discarded first.
    pub fn record(&mut self, pipeline: &Pipeline) -> bool {
        if self.entries[self.index].matches(pipeline) {
            return false;
        }
        self.entries.truncate(self.index + 1);
        self.entries.push(Snapshot::of(pipeline));
        self.index = self.entries.len() - 1;
        true
    }

    /// Step the cursor back and restore that content into the pipeline.
    pub fn undo(&mut self, pipeline: &mut Pipeline) -> bool {
        if self.index == 0 {
            log::warn!("undo requested with nothing to undo");
            return false;
        }
        self.index -= 1;
        self.entries[self.index].restore(pipeline);
        true
    }

    /// Step the cursor forward and restore that content into the
    /// pipeline.
    pub fn redo(&mut self, pipeline: &mut Pipeline) -> bool {
        if self.index + 1 >= self.entries.len() {
            log::warn!("redo requested with nothing to redo");
            return false;
        }
        self.index += 1;
        self.entries[self.index].restore(pipeline);
        true
    }

    #[must_use]
    pub const fn can_undo(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Number of entries currently held, the cursor's own included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Record any pending content, then mark the result as the saved
    /// state. With `erase`, every other entry is forgotten as well.
    pub fn mark_saved(&mut self, pipeline: &Pipeline, erase: bool) {
        self.record(pipeline);
        self.saved = Snapshot::of(pipeline);
        if erase {
            self.entries = vec![self.saved.clone()];
            self.index = 0;
        }
    }

    /// Whether the content at the cursor differs from the last saved
    /// state.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.entries[self.index] != self.saved
    }
}
