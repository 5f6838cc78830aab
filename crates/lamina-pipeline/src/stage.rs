//! Pipeline stages and their configurations.
//!
//! A pipeline is an ordered list of [`Stage`]s: one [`InputStage`] that
//! produces the source bitmap, followed by [`AdjustmentStage`]s that
//! each transform their predecessor's output. Stage behavior is a
//! closed set of [`StageConfig`] variants; each variant declares
//! whether it can change pixel colors, dimensions, or both, which is
//! what the reorderer and the size predictor reason about.
//!
//! Configs are plain serializable data. What a config *does* to pixels
//! lives in the render backend; what it does to *sizes* is predicted
//! here by [`StageConfig::output_size`], and the backend resizes to
//! exactly the predicted dimensions so prediction never drifts from
//! rendering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::Dimensions;
use crate::zoom::ZoomFactor;

/// Where an input stage reads its image from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// Decode from a file on disk.
    File { path: PathBuf },
    /// Decode from bytes already in memory.
    Memory { bytes: Vec<u8> },
}

/// One control point of a [`StageConfig::Curves`] mapping, with both
/// coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

/// The closed set of adjustment behaviors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    /// Per-channel gamma correction.
    Gamma { gamma: f64 },
    /// Piecewise-linear tone curve applied to every channel.
    Curves { points: Vec<CurvePoint> },
    /// Weighted channel mix to grayscale.
    GrayscaleMixer { red: f64, green: f64, blue: f64 },
    /// Invert every color channel.
    Invert,
    /// Gaussian blur with the given standard deviation.
    Blur { sigma: f64 },
    /// Scale to fit within a bounding box, preserving aspect ratio.
    Resize { max_width: u32, max_height: u32 },
    /// Extract a rectangle, clamped to the source bounds.
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Surround the image with a solid-color border.
    SolidBorder { thickness: u32, color: [u8; 4] },
    /// Scale by an exact zoom ratio, for screen display.
    ViewScale { zoom: ZoomFactor },
}

impl StageConfig {
    /// Whether this stage can produce output sized differently from its
    /// input.
    #[must_use]
    pub const fn can_change_dimensions(&self) -> bool {
        matches!(
            self,
            Self::Resize { .. }
                | Self::Crop { .. }
                | Self::SolidBorder { .. }
                | Self::ViewScale { .. }
        )
    }

    /// Whether this stage can change pixel values independently of any
    /// size change.
    #[must_use]
    pub const fn can_change_colors(&self) -> bool {
        matches!(
            self,
            Self::Gamma { .. }
                | Self::Curves { .. }
                | Self::GrayscaleMixer { .. }
                | Self::Invert
                | Self::Blur { .. }
                | Self::SolidBorder { .. }
        )
    }

    /// The name a stage gets when the caller does not supply one.
    #[must_use]
    pub const fn default_name(&self) -> &'static str {
        match self {
            Self::Gamma { .. } => "gamma",
            Self::Curves { .. } => "curves",
            Self::GrayscaleMixer { .. } => "grayscale-mixer",
            Self::Invert => "invert",
            Self::Blur { .. } => "blur",
            Self::Resize { .. } => "resize",
            Self::Crop { .. } => "crop",
            Self::SolidBorder { .. } => "solid-border",
            Self::ViewScale { .. } => "view-scale",
        }
    }

    /// Predict the output size for a given input size without rendering.
    ///
    /// The render backend produces exactly these dimensions, so layout
    /// computed from prediction matches the bitmap that later arrives.
    #[must_use]
    pub fn output_size(&self, input: Dimensions) -> Dimensions {
        match *self {
            Self::Resize {
                max_width,
                max_height,
            } => fit_within(input, max_width, max_height),
            Self::Crop {
                x,
                y,
                width,
                height,
            } => clamp_crop(input, x, y, width, height).2,
            Self::SolidBorder { thickness, .. } => {
                let margin = thickness.saturating_mul(2);
                Dimensions::new(
                    input.width.saturating_add(margin),
                    input.height.saturating_add(margin),
                )
            }
            Self::ViewScale { zoom } => {
                let scaled = zoom.scale_dimensions(input);
                Dimensions::new(scaled.width.max(1), scaled.height.max(1))
            }
            _ => input,
        }
    }
}

/// Scale `input` to fit within `max_width` x `max_height`, preserving
/// aspect ratio. Upscales when the input is smaller than the box.
pub(crate) fn fit_within(input: Dimensions, max_width: u32, max_height: u32) -> Dimensions {
    if input.width == 0 || input.height == 0 {
        return input;
    }
    let ratio_w = f64::from(max_width.max(1)) / f64::from(input.width);
    let ratio_h = f64::from(max_height.max(1)) / f64::from(input.height);
    let factor = ratio_w.min(ratio_h);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let width = (f64::from(input.width) * factor).round() as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let height = (f64::from(input.height) * factor).round() as u32;
    Dimensions::new(width.max(1), height.max(1))
}

/// Clamp a crop rectangle to the input bounds. Returns the clamped
/// origin and the size of the rectangle actually available, never
/// smaller than one pixel in either direction.
pub(crate) fn clamp_crop(
    input: Dimensions,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> (u32, u32, Dimensions) {
    if input.width == 0 || input.height == 0 {
        return (0, 0, input);
    }
    let x = x.min(input.width - 1);
    let y = y.min(input.height - 1);
    let width = width.min(input.width - x).max(1);
    let height = height.min(input.height - y).max(1);
    (x, y, Dimensions::new(width, height))
}

fn default_active() -> bool {
    true
}

/// A named, switchable transform step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentStage {
    name: String,
    #[serde(default = "default_active")]
    active: bool,
    config: StageConfig,
}

impl AdjustmentStage {
    /// Create an active stage named after its config.
    #[must_use]
    pub fn new(config: StageConfig) -> Self {
        Self {
            name: config.default_name().to_string(),
            active: true,
            config,
        }
    }

    /// Create an active stage with an explicit name.
    #[must_use]
    pub fn named(name: impl Into<String>, config: StageConfig) -> Self {
        Self {
            name: name.into(),
            active: true,
            config,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_config(&mut self, config: StageConfig) {
        self.config = config;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    #[must_use]
    pub const fn can_change_dimensions(&self) -> bool {
        self.config.can_change_dimensions()
    }

    #[must_use]
    pub const fn can_change_colors(&self) -> bool {
        self.config.can_change_colors()
    }
}

/// The stage that produces the pipeline's source bitmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputStage {
    name: String,
    #[serde(default = "default_active")]
    active: bool,
    source: InputSource,
}

impl InputStage {
    /// An input stage reading from a file.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            name: "input".to_string(),
            active: true,
            source: InputSource::File { path: path.into() },
        }
    }

    /// An input stage decoding from in-memory bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            name: "input".to_string(),
            active: true,
            source: InputSource::Memory { bytes },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

/// Any stage in a pipeline's ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Input(InputStage),
    Adjustment(AdjustmentStage),
}

impl Stage {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Input(stage) => stage.name(),
            Self::Adjustment(stage) => stage.name(),
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        match self {
            Self::Input(stage) => stage.is_active(),
            Self::Adjustment(stage) => stage.is_active(),
        }
    }

    pub fn set_active(&mut self, active: bool) {
        match self {
            Self::Input(stage) => stage.set_active(active),
            Self::Adjustment(stage) => stage.set_active(active),
        }
    }

    #[must_use]
    pub const fn as_input(&self) -> Option<&InputStage> {
        match self {
            Self::Input(stage) => Some(stage),
            Self::Adjustment(_) => None,
        }
    }

    #[must_use]
    pub const fn as_adjustment(&self) -> Option<&AdjustmentStage> {
        match self {
            Self::Adjustment(stage) => Some(stage),
            Self::Input(_) => None,
        }
    }

    pub fn as_adjustment_mut(&mut self) -> Option<&mut AdjustmentStage> {
        match self {
            Self::Adjustment(stage) => Some(stage),
            Self::Input(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn size(width: u32, height: u32) -> Dimensions {
        Dimensions::new(width, height)
    }

    // --- Capabilities ---

    #[test]
    fn color_stages_do_not_change_dimensions() {
        let configs = [
            StageConfig::Gamma { gamma: 2.2 },
            StageConfig::Curves { points: Vec::new() },
            StageConfig::GrayscaleMixer {
                red: 0.3,
                green: 0.6,
                blue: 0.1,
            },
            StageConfig::Invert,
            StageConfig::Blur { sigma: 1.5 },
        ];
        for config in configs {
            assert!(config.can_change_colors(), "{}", config.default_name());
            assert!(!config.can_change_dimensions(), "{}", config.default_name());
        }
    }

    #[test]
    fn geometry_stages_do_not_change_colors() {
        let configs = [
            StageConfig::Resize {
                max_width: 100,
                max_height: 100,
            },
            StageConfig::Crop {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            StageConfig::ViewScale {
                zoom: ZoomFactor::ONE,
            },
        ];
        for config in configs {
            assert!(config.can_change_dimensions(), "{}", config.default_name());
            assert!(!config.can_change_colors(), "{}", config.default_name());
        }
    }

    #[test]
    fn solid_border_changes_both() {
        let config = StageConfig::SolidBorder {
            thickness: 4,
            color: [0, 0, 0, 255],
        };
        assert!(config.can_change_dimensions());
        assert!(config.can_change_colors());
    }

    // --- Size prediction ---

    #[test]
    fn resize_fits_within_the_box_preserving_aspect() {
        let config = StageConfig::Resize {
            max_width: 100,
            max_height: 100,
        };
        assert_eq!(config.output_size(size(400, 200)), size(100, 50));
        assert_eq!(config.output_size(size(200, 400)), size(50, 100));
    }

    #[test]
    fn resize_upscales_small_inputs() {
        let config = StageConfig::Resize {
            max_width: 100,
            max_height: 100,
        };
        assert_eq!(config.output_size(size(10, 5)), size(100, 50));
    }

    #[test]
    fn resize_rounds_the_free_axis() {
        let config = StageConfig::Resize {
            max_width: 100,
            max_height: 100,
        };
        // 640x427 scaled by 100/640 gives 66.72 in height.
        assert_eq!(config.output_size(size(640, 427)), size(100, 67));
    }

    #[test]
    fn crop_is_clamped_to_the_source() {
        let config = StageConfig::Crop {
            x: 50,
            y: 50,
            width: 100,
            height: 100,
        };
        assert_eq!(config.output_size(size(80, 80)), size(30, 30));
    }

    #[test]
    fn crop_origin_beyond_the_source_yields_one_pixel() {
        let config = StageConfig::Crop {
            x: 500,
            y: 500,
            width: 10,
            height: 10,
        };
        assert_eq!(config.output_size(size(80, 80)), size(1, 1));
    }

    #[test]
    fn border_grows_both_axes_by_twice_the_thickness() {
        let config = StageConfig::SolidBorder {
            thickness: 8,
            color: [255, 255, 255, 255],
        };
        assert_eq!(config.output_size(size(100, 60)), size(116, 76));
    }

    #[test]
    fn view_scale_never_predicts_a_zero_extent() {
        let mut zoom = ZoomFactor::ONE;
        for _ in 0..6 {
            zoom = zoom.zoom_out();
        }
        let config = StageConfig::ViewScale { zoom };
        assert_eq!(config.output_size(size(3, 3)), size(1, 1));
    }

    #[test]
    fn color_stages_predict_their_input_size() {
        let config = StageConfig::Gamma { gamma: 1.8 };
        assert_eq!(config.output_size(size(123, 45)), size(123, 45));
    }

    #[test]
    fn clamp_crop_keeps_the_rectangle_inside() {
        let (x, y, extent) = clamp_crop(size(80, 80), 90, 10, 20, 200);
        assert_eq!((x, y), (79, 10));
        assert_eq!(extent, size(1, 70));
    }

    // --- Stage construction ---

    #[test]
    fn new_stage_takes_the_default_name_and_is_active() {
        let stage = AdjustmentStage::new(StageConfig::Invert);
        assert_eq!(stage.name(), "invert");
        assert!(stage.is_active());
    }

    #[test]
    fn named_stage_keeps_the_given_name() {
        let stage = AdjustmentStage::named("soften", StageConfig::Blur { sigma: 2.0 });
        assert_eq!(stage.name(), "soften");
    }

    #[test]
    fn input_stage_is_named_input() {
        let stage = InputStage::from_path("photo.png");
        assert_eq!(stage.name(), "input");
        assert!(stage.is_active());
    }

    #[test]
    fn stage_accessors_distinguish_the_variants() {
        let input = Stage::Input(InputStage::from_bytes(vec![1, 2, 3]));
        let adjustment = Stage::Adjustment(AdjustmentStage::new(StageConfig::Invert));
        assert!(input.as_input().is_some());
        assert!(input.as_adjustment().is_none());
        assert!(adjustment.as_adjustment().is_some());
        assert!(adjustment.as_input().is_none());
    }

    // --- Serialization ---

    #[test]
    fn configs_serialize_with_a_kind_tag() {
        let config = StageConfig::Gamma { gamma: 2.2 };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"kind":"gamma","gamma":2.2}"#);
    }

    #[test]
    fn stages_round_trip_through_json() {
        let stage = Stage::Adjustment(AdjustmentStage::named(
            "frame",
            StageConfig::SolidBorder {
                thickness: 2,
                color: [10, 20, 30, 255],
            },
        ));
        let json = serde_json::to_string(&stage).unwrap();
        let back: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stage);
    }

    #[test]
    fn missing_active_field_deserializes_as_active() {
        let json = r#"{"name":"gamma","config":{"kind":"gamma","gamma":1.4}}"#;
        let stage: AdjustmentStage = serde_json::from_str(json).unwrap();
        assert!(stage.is_active());
    }
}
