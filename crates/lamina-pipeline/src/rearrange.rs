//! Stage reordering for faster previews.
//!
//! Geometry-only stages shrink (or at least bound) the pixels every
//! later stage has to touch, so previews run faster when they happen
//! early. [`optimize_order`] hoists stages that can only change
//! dimensions ahead of stages that can only change colors, and treats
//! a stage that can do both as a barrier nothing crosses. Relative
//! order within each class is preserved.
//!
//! This is an approximation: a color stage whose effect depends on
//! pixel density (a blur, say) will look slightly different after its
//! input has been scaled. The accurate path simply skips this pass.

use crate::stage::AdjustmentStage;

/// Reorder stage references so geometry-only stages run before the
/// color-only stages they previously followed.
#[must_use]
pub fn optimize_order<'a>(stages: &[&'a AdjustmentStage]) -> Vec<&'a AdjustmentStage> {
    let mut ordered = Vec::with_capacity(stages.len());
    let mut pending: Vec<&AdjustmentStage> = Vec::new();
    for &stage in stages {
        if stage.can_change_dimensions() {
            if stage.can_change_colors() {
                // Barrier: everything buffered so far must stay before it.
                ordered.append(&mut pending);
            }
            ordered.push(stage);
        } else {
            pending.push(stage);
        }
    }
    ordered.append(&mut pending);
    ordered
}
