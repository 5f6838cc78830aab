//! The pipeline: an ordered, editable list of stages and its renders.
//!
//! A [`Pipeline`] owns the stage list (the *content*), plus transient
//! state that never serializes: the preview [`ViewState`], the chosen
//! [`PreviewQuality`], the memoized current preview, and a revision
//! counter. Every content mutation funnels through the methods here,
//! which bump the revision and drop the memoized preview; callers watch
//! the revision instead of subscribing to change events.
//!
//! Rendering comes in two shapes. [`Pipeline::render_at_size`] is the
//! interactive path: it appends a synthetic view-scale stage fitted to
//! the viewport and, under [`PreviewQuality::Fast`], reorders stages so
//! scaling happens early. [`Pipeline::render_full`] is the export path:
//! user stages only, in their exact order.

use serde::{Deserialize, Serialize};

use crate::bitmap::SharedBitmap;
use crate::rearrange::optimize_order;
use crate::render::{Renderer, StageBackend};
use crate::stage::{AdjustmentStage, InputStage, Stage, StageConfig};
use crate::types::{Dimensions, PipelineError, PreviewQuality};
use crate::view::ViewState;
use crate::zoom::ZoomFactor;

/// An editable image-processing pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    #[serde(skip)]
    view: ViewState,
    #[serde(skip)]
    quality: PreviewQuality,
    #[serde(skip)]
    current: Option<SharedBitmap>,
    #[serde(skip)]
    revision: u64,
}

impl Pipeline {
    /// An empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Accessors ---

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The input stage, when one sits in front.
    #[must_use]
    pub fn input(&self) -> Option<&InputStage> {
        self.stages.first().and_then(Stage::as_input)
    }

    /// The adjustment stages in pipeline order.
    pub fn adjustments(&self) -> impl Iterator<Item = &AdjustmentStage> {
        self.stages.iter().filter_map(Stage::as_adjustment)
    }

    /// Index of the stage with the given name.
    #[must_use]
    pub fn find_stage(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.name() == name)
    }

    /// Monotonic counter, bumped on every content change.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub const fn zoom(&self) -> ZoomFactor {
        self.view.zoom()
    }

    #[must_use]
    pub const fn quality(&self) -> PreviewQuality {
        self.quality
    }

    // --- Content mutation ---

    /// Install or replace the input stage at the front.
    pub fn set_input(&mut self, input: InputStage) {
        if let Some(Stage::Input(existing)) = self.stages.first_mut() {
            *existing = input;
        } else {
            self.stages.insert(0, Stage::Input(input));
        }
        self.touch();
    }

    /// Append an adjustment stage, renaming it if its name is taken.
    /// Returns the stage's index.
    pub fn add_stage(&mut self, mut stage: AdjustmentStage) -> usize {
        let name = self.unique_name(stage.name());
        stage.set_name(name);
        self.stages.push(Stage::Adjustment(stage));
        self.touch();
        self.stages.len() - 1
    }

    /// Insert an adjustment stage, clamping the index so it lands after
    /// the input stage and inside the list. Returns the actual index.
    pub fn insert_stage(&mut self, index: usize, mut stage: AdjustmentStage) -> usize {
        let name = self.unique_name(stage.name());
        stage.set_name(name);
        let floor = usize::from(self.input().is_some());
        let index = index.max(floor).min(self.stages.len());
        self.stages.insert(index, Stage::Adjustment(stage));
        self.touch();
        index
    }

    /// Remove and return the stage at `index`.
    pub fn remove_stage(&mut self, index: usize) -> Option<Stage> {
        if index >= self.stages.len() {
            log::warn!(
                "remove_stage: index {index} out of bounds (len {})",
                self.stages.len(),
            );
            return None;
        }
        let removed = self.stages.remove(index);
        self.touch();
        Some(removed)
    }

    /// Move the stage at `from` to position `to`. The input stage never
    /// moves, and nothing can move in front of it. Returns whether the
    /// list changed.
    pub fn move_stage(&mut self, from: usize, to: usize) -> bool {
        let Some(moving) = self.stages.get(from) else {
            log::warn!(
                "move_stage: index {from} out of bounds (len {})",
                self.stages.len(),
            );
            return false;
        };
        if moving.as_input().is_some() {
            log::warn!("move_stage: the input stage stays first");
            return false;
        }
        let floor = usize::from(self.input().is_some());
        let to = to.max(floor).min(self.stages.len() - 1);
        if from == to {
            return false;
        }
        let stage = self.stages.remove(from);
        self.stages.insert(to, stage);
        self.touch();
        true
    }

    /// Activate or deactivate the stage at `index`. Returns whether the
    /// flag changed.
    pub fn set_stage_active(&mut self, index: usize, active: bool) -> bool {
        let Some(stage) = self.stages.get_mut(index) else {
            log::warn!("set_stage_active: index {index} out of bounds");
            return false;
        };
        if stage.is_active() == active {
            return false;
        }
        stage.set_active(active);
        self.touch();
        true
    }

    /// Replace the configuration of the adjustment stage at `index`.
    /// Returns whether the configuration actually changed.
    pub fn update_stage(&mut self, index: usize, config: StageConfig) -> bool {
        let Some(stage) = self.stages.get_mut(index).and_then(Stage::as_adjustment_mut) else {
            log::warn!("update_stage: no adjustment stage at index {index}");
            return false;
        };
        if stage.config() == &config {
            return false;
        }
        stage.set_config(config);
        self.touch();
        true
    }

    /// Whether two pipelines hold the same stage content. Transient
    /// state (view, quality, memoized preview) is ignored.
    #[must_use]
    pub fn content_equals(&self, other: &Self) -> bool {
        self.stages == other.stages
    }

    /// Adopt another pipeline's stage content if it differs. Returns
    /// whether anything changed.
    pub fn sync_content_from(&mut self, other: &Self) -> bool {
        if self.content_equals(other) {
            return false;
        }
        self.stages.clone_from(&other.stages);
        self.touch();
        true
    }

    pub(crate) fn set_stages(&mut self, stages: Vec<Stage>) {
        self.stages = stages;
        self.touch();
    }

    // --- View state ---

    /// Step the preview zoom in. The stage content is untouched, so the
    /// revision does not move; only the memoized preview is dropped.
    pub fn zoom_in(&mut self) -> ZoomFactor {
        let zoom = self.view.zoom_in();
        self.invalidate();
        zoom
    }

    /// Step the preview zoom out.
    pub fn zoom_out(&mut self) -> ZoomFactor {
        let zoom = self.view.zoom_out();
        self.invalidate();
        zoom
    }

    /// Select the preview quality.
    pub fn set_quality(&mut self, quality: PreviewQuality) {
        if self.quality != quality {
            self.quality = quality;
            self.invalidate();
        }
    }

    // --- Rendering ---

    /// Render the preview, reusing the memoized result when nothing has
    /// changed since the last call.
    ///
    /// `Ok(None)` means the pipeline is empty.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when the stage list has no leading
    /// active input stage or the input fails to load.
    pub fn render<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        if let Some(current) = &self.current {
            return Ok(Some(SharedBitmap::clone(current)));
        }
        let result = self.evaluate(renderer, true)?;
        self.current.clone_from(&result);
        Ok(result)
    }

    /// Render the preview scaled for a viewport of the given size.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Pipeline::render`].
    pub fn render_at_size<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        viewport: Dimensions,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        if self.view.set_viewport(viewport) {
            self.invalidate();
        }
        self.render(renderer)
    }

    /// Render the full-resolution result: user stages only, in their
    /// exact order, with no view scaling. For export.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Pipeline::render`].
    pub fn render_full<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        self.evaluate(renderer, false)
    }

    /// Predict the full-resolution output size without rendering any
    /// adjustment, by folding each active stage's size function over
    /// the input dimensions.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Pipeline::render`]; the input must load so
    /// its dimensions are known.
    pub fn predicted_size<B: StageBackend>(
        &self,
        renderer: &mut Renderer<B>,
    ) -> Result<Option<Dimensions>, PipelineError> {
        let Some(input) = validated_input(&self.stages)? else {
            return Ok(None);
        };
        let mut size = renderer.input_size(input)?;
        for stage in self.stages.iter().filter(|stage| stage.is_active()) {
            if let Some(adjustment) = stage.as_adjustment() {
                size = adjustment.config().output_size(size);
            }
        }
        Ok(Some(size))
    }

    fn evaluate<B: StageBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        with_view: bool,
    ) -> Result<Option<SharedBitmap>, PipelineError> {
        let Some(input) = validated_input(&self.stages)? else {
            return Ok(None);
        };
        let source = renderer.input_bitmap(input)?;

        let active: Vec<&AdjustmentStage> = self
            .stages
            .iter()
            .filter(|stage| stage.is_active())
            .filter_map(Stage::as_adjustment)
            .collect();

        // The synthetic view stage is fitted against the size the user
        // stages will hand it, not the raw input size.
        let view_stage = if with_view {
            let upstream = active.iter().fold(source.dimensions(), |size, stage| {
                stage.config().output_size(size)
            });
            self.view.fit(upstream);
            self.view.stage()
        } else {
            None
        };

        let mut order = active;
        if let Some(stage) = view_stage.as_ref() {
            order.push(stage);
        }
        if with_view && self.quality == PreviewQuality::Fast {
            order = optimize_order(&order);
        }

        let mut result = source;
        for stage in order {
            result = renderer.apply(&result, stage);
        }
        Ok(Some(result))
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.current = None;
    }

    fn invalidate(&mut self) {
        self.current = None;
    }

    fn unique_name(&self, base: &str) -> String {
        if self.find_stage(base).is_none() {
            return base.to_string();
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{base}-{counter}");
            if self.find_stage(&candidate).is_none() {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Check the stage list shape: either empty (`Ok(None)`) or led by a
/// single active input stage.
fn validated_input(stages: &[Stage]) -> Result<Option<&InputStage>, PipelineError> {
    let Some(first) = stages.first() else {
        return Ok(None);
    };
    let Some(input) = first.as_input() else {
        return Err(PipelineError::MissingInput);
    };
    if !input.is_active() {
        return Err(PipelineError::InactiveInput);
    }
    // The mutation API cannot build this shape; deserialized or synced
    // content could.
    if let Some(position) = stages
        .iter()
        .skip(1)
        .position(|stage| stage.as_input().is_some())
    {
        return Err(PipelineError::InputNotFirst {
            position: position + 1,
        });
    }
    Ok(Some(input))
}
