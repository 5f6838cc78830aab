//! Shared types for the lamina pipeline engine.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can construct and inspect
/// pixel data without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if both axes fit inside `other`.
    #[must_use]
    pub const fn fits_within(self, other: Self) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How a preview render trades accuracy for speed.
///
/// `Fast` lets the evaluator reorder stages so dimension-reducing work
/// runs before expensive per-pixel work (see
/// [`rearrange::optimize_order`](crate::rearrange::optimize_order));
/// `Accurate` always evaluates in the authoritative stage order. Export
/// rendering ignores this setting and is always accurate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreviewQuality {
    /// Evaluate stages in their authoritative order.
    #[default]
    Accurate,
    /// Allow result-equivalent stage reordering for cheaper previews.
    Fast,
}

/// Capacity settings for the bitmap cache.
///
/// All counts are entry counts, not byte budgets. The defaults suit an
/// interactive editing session previewing a handful of configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries retained in the input partition (decoded source images).
    pub input_capacity: usize,
    /// Entries retained per upstream bitmap in the adjustment partition.
    pub stage_capacity: usize,
    /// How many recently touched upstream bitmaps are kept strongly
    /// referenced so their sub-caches survive upstream replacement.
    pub keep_alive: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            input_capacity: 4,
            stage_capacity: 24,
            keep_alive: 4,
        }
    }
}

/// Errors from the input-loading collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Reading the source file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the unreadable file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source bytes could not be decoded as an image.
    #[error("failed to decode input image: {0}")]
    Decode(#[from] image::ImageError),

    /// The input source contained no data.
    #[error("input source has no data")]
    EmptyInput,
}

/// Errors from the pixel-transform collaborator.
///
/// These never escape a render call: the evaluator recovers by passing
/// the stage's input through unchanged and logging a warning.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The stage's configuration values are unusable.
    #[error("invalid stage parameters: {0}")]
    InvalidParams(String),

    /// The transform itself failed.
    #[error("transform failed: {0}")]
    Failed(String),
}

/// Errors surfaced from pipeline evaluation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input stage's loader failed; no bitmap was produced.
    #[error("failed to load pipeline input: {0}")]
    InputLoad(#[from] LoadError),

    /// The pipeline is non-empty but its first stage is not an input
    /// stage.
    #[error("the pipeline's first stage is not an input stage")]
    MissingInput,

    /// The input stage is present but deactivated.
    #[error("the pipeline's input stage is inactive")]
    InactiveInput,

    /// An input stage was found beyond position 0. The mutation API
    /// never builds this shape, but a deserialized stage list can.
    #[error("stage {position} is an input stage but is not first in the pipeline")]
    InputNotFirst {
        /// Index of the misplaced input stage.
        position: usize,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Dimensions tests ---

    #[test]
    fn dimensions_fits_within_itself() {
        let d = Dimensions::new(100, 200);
        assert!(d.fits_within(d));
    }

    #[test]
    fn dimensions_fits_within_requires_both_axes() {
        let d = Dimensions::new(100, 200);
        assert!(d.fits_within(Dimensions::new(100, 201)));
        assert!(!d.fits_within(Dimensions::new(99, 200)));
        assert!(!d.fits_within(Dimensions::new(100, 199)));
    }

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::new(640, 480).to_string(), "640x480");
    }

    #[test]
    fn dimensions_serde_round_trip() {
        let d = Dimensions::new(640, 480);
        let json = serde_json::to_string(&d).unwrap();
        let deserialized: Dimensions = serde_json::from_str(&json).unwrap();
        assert_eq!(d, deserialized);
    }

    // --- PreviewQuality tests ---

    #[test]
    fn preview_quality_defaults_to_accurate() {
        assert_eq!(PreviewQuality::default(), PreviewQuality::Accurate);
    }

    // --- CacheConfig tests ---

    #[test]
    fn cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.input_capacity, 4);
        assert_eq!(config.stage_capacity, 24);
        assert_eq!(config.keep_alive, 4);
    }

    #[test]
    fn cache_config_deserializes_missing_fields_to_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"stage_capacity": 8}"#).unwrap();
        assert_eq!(config.stage_capacity, 8);
        assert_eq!(config.input_capacity, CacheConfig::default().input_capacity);
        assert_eq!(config.keep_alive, CacheConfig::default().keep_alive);
    }

    // --- Error display tests ---

    #[test]
    fn load_error_empty_input_display() {
        assert_eq!(
            LoadError::EmptyInput.to_string(),
            "input source has no data",
        );
    }

    #[test]
    fn transform_error_invalid_params_display() {
        let err = TransformError::InvalidParams("gamma must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid stage parameters: gamma must be positive",
        );
    }

    #[test]
    fn pipeline_error_missing_input_display() {
        assert_eq!(
            PipelineError::MissingInput.to_string(),
            "the pipeline's first stage is not an input stage",
        );
    }

    #[test]
    fn pipeline_error_input_not_first_names_position() {
        let err = PipelineError::InputNotFirst { position: 3 };
        assert_eq!(
            err.to_string(),
            "stage 3 is an input stage but is not first in the pipeline",
        );
    }

    #[test]
    fn pipeline_error_wraps_load_error() {
        let err = PipelineError::from(LoadError::EmptyInput);
        assert!(matches!(err, PipelineError::InputLoad(_)));
        assert_eq!(
            err.to_string(),
            "failed to load pipeline input: input source has no data",
        );
    }
}
