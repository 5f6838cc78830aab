//! Viewport state: what part of the zoom ladder a preview renders at.
//!
//! [`ViewState`] remembers the viewport size, the last seen upstream
//! image size, and the current [`ZoomFactor`]. When the upstream size
//! changes (new input, edited resize) the zoom re-fits automatically;
//! manual zoom steps persist across renders until the next size change.
//! The state materializes as a synthetic view-scale stage appended
//! after the user's stages during preview evaluation.

use crate::stage::{AdjustmentStage, StageConfig};
use crate::types::Dimensions;
use crate::zoom::ZoomFactor;

/// Preview viewport and zoom tracking.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    viewport: Option<Dimensions>,
    upstream: Option<Dimensions>,
    zoom: ZoomFactor,
}

impl ViewState {
    /// Record the viewport size. Returns whether it changed.
    pub fn set_viewport(&mut self, viewport: Dimensions) -> bool {
        if self.viewport == Some(viewport) {
            return false;
        }
        self.viewport = Some(viewport);
        true
    }

    #[must_use]
    pub const fn viewport(&self) -> Option<Dimensions> {
        self.viewport
    }

    #[must_use]
    pub const fn zoom(&self) -> ZoomFactor {
        self.zoom
    }

    /// Step the zoom one ladder position toward magnification.
    pub fn zoom_in(&mut self) -> ZoomFactor {
        self.zoom = self.zoom.zoom_in();
        self.zoom
    }

    /// Step the zoom one ladder position toward reduction.
    pub fn zoom_out(&mut self) -> ZoomFactor {
        self.zoom = self.zoom.zoom_out();
        self.zoom
    }

    /// Reconcile the zoom with the current upstream image size.
    ///
    /// Re-fits only when the upstream size differs from the last call,
    /// so a manually chosen zoom survives ordinary re-renders.
    pub fn fit(&mut self, upstream: Dimensions) -> ZoomFactor {
        if self.upstream != Some(upstream) {
            self.upstream = Some(upstream);
            if let Some(viewport) = self.viewport {
                self.zoom = auto_zoom(upstream, viewport);
            }
        }
        self.zoom
    }

    /// The synthetic stage realizing the current zoom, if a viewport
    /// has been set.
    #[must_use]
    pub fn stage(&self) -> Option<AdjustmentStage> {
        self.viewport?;
        Some(AdjustmentStage::named(
            "view-scale",
            StageConfig::ViewScale { zoom: self.zoom },
        ))
    }
}

/// The largest ladder zoom, capped at 1:1, at which `upstream` fits
/// inside `viewport`.
fn auto_zoom(upstream: Dimensions, viewport: Dimensions) -> ZoomFactor {
    let mut zoom = ZoomFactor::ONE;
    while !zoom.scale_dimensions(upstream).fits_within(viewport) {
        let next = zoom.zoom_out();
        if next == zoom {
            break;
        }
        zoom = next;
    }
    zoom
}
