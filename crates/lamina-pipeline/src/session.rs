//! An editing session: pipeline, history, and automatic recording.
//!
//! [`EditSession`] fronts the [`Pipeline`] mutation API and records a
//! history entry after every successful change, so callers get undo
//! for free. Batching suspends recording: wrap a run of related edits
//! in [`EditSession::begin_batch`] / [`EditSession::end_batch`] and
//! they collapse into a single undo step. View changes (zoom, quality)
//! bypass history entirely.

use crate::bitmap::SharedBitmap;
use crate::history::History;
use crate::pipeline::Pipeline;
use crate::render::{Renderer, StageBackend};
use crate::stage::{AdjustmentStage, InputStage, Stage, StageConfig};
use crate::types::{Dimensions, PipelineError, PreviewQuality};
use crate::zoom::ZoomFactor;

/// A pipeline under edit, with undo/redo and dirty tracking.
#[derive(Debug)]
pub struct EditSession {
    pipeline: Pipeline,
    history: History,
    batch_depth: u32,
}

impl EditSession {
    /// A session over an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pipeline(Pipeline::new())
    }

    /// A session over existing content, for example a deserialized
    /// project. The content becomes both the first history entry and
    /// the saved state.
    #[must_use]
    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        let history = History::new(&pipeline);
        Self {
            pipeline,
            history,
            batch_depth: 0,
        }
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    // --- Content edits (auto-recorded) ---

    pub fn set_input(&mut self, input: InputStage) {
        self.pipeline.set_input(input);
        self.auto_record();
    }

    pub fn add_stage(&mut self, stage: AdjustmentStage) -> usize {
        let index = self.pipeline.add_stage(stage);
        self.auto_record();
        index
    }

    pub fn insert_stage(&mut self, index: usize, stage: AdjustmentStage) -> usize {
        let index = self.pipeline.insert_stage(index, stage);
        self.auto_record();
        index
    }

    pub fn remove_stage(&mut self, index: usize) -> Option<Stage> {
        let removed = self.pipeline.remove_stage(index);
        if removed.is_some() {
            self.auto_record();
        }
        removed
    }

    pub fn move_stage(&mut self, from: usize, to: usize) -> bool {
        let moved = self.pipeline.move_stage(from, to);
        if moved {
            self.auto_record();
        }
        moved
    }

    pub fn set_stage_active(&mut self, index: usize, active: bool) -> bool {
        let changed = self.pipeline.set_stage_active(index, active);
        if changed {
            self.auto_record();
        }
        changed
    }

    pub fn update_stage(&mut self, index: usize, config: StageConfig) -> bool {
        let changed = self.pipeline.update_stage(index, config);
        if changed {
            self.auto_record();
        }
        changed
    }

    // --- Batching ---

    /// Suspend automatic recording until the matching
    /// [`EditSession::end_batch`]. Batches nest.
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close the innermost batch; closing the outermost one records the
    /// accumulated changes as a single history entry. An unmatched call
    /// logs and does nothing.
    pub fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            log::warn!("end_batch without a matching begin_batch");
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.history.record(&self.pipeline);
        }
    }

    // --- History ---

    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.pipeline)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.pipeline)
    }

    #[must_use]
    pub const fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Record the current content explicitly. Useful when edits happen
    /// through [`Pipeline`] content sync rather than this facade.
    pub fn record(&mut self) -> bool {
        self.history.record(&self.pipeline)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.history.is_dirty()
    }

    /// Mark the current content as saved. With `erase`, the history
    /// collapses to this single state.
    pub fn mark_saved(&mut self, erase: bool) {
        self.history.mark_saved(&self.pipeline, erase);
    }

    // --- View ---

    pub fn zoom_in(&mut self) -> ZoomFactor {
        self.pipeline.zoom_in()
    }

    pub fn zoom_out(&mut self) -> ZoomFactor {
        self.pipeline.zoom_out()
    }

    pub fn set_quality(&mut self, quality: PreviewQuality) {
        self.pipeline.set_quality(quality);
    }

    // --- Rendering ---

    /// Render the preview through the session's pipeline.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError`] from evaluation.
    pub fn render<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        self.pipeline.render(renderer)
    }

    /// Render the preview at a viewport size.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError`] from evaluation.
    pub fn render_at_size<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        viewport: Dimensions,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        self.pipeline.render_at_size(renderer, viewport)
    }

    /// Render the full-resolution result.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError`] from evaluation.
    pub fn render_full<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        self.pipeline.render_full(renderer)
    }

    fn auto_record(&mut self) {
        if self.batch_depth == 0 {
            self.history.record(&self.pipeline);
        }
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}
