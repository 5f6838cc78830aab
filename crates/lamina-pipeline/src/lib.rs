//! lamina-pipeline: Cached, reorderable image-editing pipeline.
//!
//! An editable chain of stages -- one input, any number of adjustments --
//! rendered through a two-tier memoization cache keyed on bitmap
//! identity, so re-rendering after an edit only recomputes what the
//! edit actually changed. Previews scale through an exact zoom ladder
//! and can reorder geometry ahead of color work for speed; undo/redo
//! and dirty tracking come from [`EditSession`].
//!
//! Apart from reading input files on request this crate is pure
//! computation: **no threads, no event loops**. Background rendering
//! lives in `lamina-worker`.

pub mod bitmap;
pub mod cache;
pub mod history;
pub mod pipeline;
pub mod rearrange;
pub mod render;
pub mod session;
pub mod stage;
pub mod transform;
pub mod types;
pub mod view;
pub mod zoom;

pub use bitmap::{Bitmap, BitmapId, SharedBitmap};
pub use cache::BitmapCache;
pub use pipeline::Pipeline;
pub use render::{Renderer, StageBackend};
pub use session::EditSession;
pub use stage::{AdjustmentStage, CurvePoint, InputSource, InputStage, Stage, StageConfig};
pub use transform::BuiltinBackend;
pub use types::{
    CacheConfig, Dimensions, LoadError, PipelineError, PreviewQuality, RgbaImage, TransformError,
};
pub use zoom::ZoomFactor;

/// Decode an image and run a list of adjustments over it at full
/// resolution, with the built-in backend and a throwaway cache.
///
/// This is the one-shot path. Interactive use wants a [`Pipeline`] (or
/// an [`EditSession`]) plus a long-lived [`Renderer`], which is where
/// the caching pays off.
///
/// # Errors
///
/// Returns [`PipelineError::InputLoad`] when the bytes cannot be
/// decoded.
pub fn render_pipeline(
    image_bytes: Vec<u8>,
    stages: impl IntoIterator<Item = StageConfig>,
) -> Result<SharedBitmap, PipelineError> {
    let mut pipeline = Pipeline::new();
    pipeline.set_input(InputStage::from_bytes(image_bytes));
    for config in stages {
        pipeline.add_stage(AdjustmentStage::new(config));
    }
    let mut renderer = Renderer::new(BuiltinBackend);
    let result = pipeline.render_full(&mut renderer)?;
    result.ok_or(PipelineError::MissingInput)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode a small solid-color PNG in memory.
    fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba(color));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn render_pipeline_applies_stages_in_order() {
        let png = solid_png(6, 4, [10, 20, 30, 255]);
        let result = render_pipeline(
            png,
            [
                StageConfig::Invert,
                StageConfig::SolidBorder {
                    thickness: 1,
                    color: [0, 0, 0, 255],
                },
            ],
        )
        .unwrap();

        assert_eq!(result.dimensions(), Dimensions::new(8, 6));
        // Border pixel, then an inverted interior pixel.
        assert_eq!(result.pixels().get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(result.pixels().get_pixel(1, 1).0, [245, 235, 225, 255]);
    }

    #[test]
    fn render_pipeline_rejects_garbage_bytes() {
        let result = render_pipeline(vec![0xFF, 0x00], []);
        assert!(matches!(result, Err(PipelineError::InputLoad(_))));
    }

    #[test]
    fn a_session_edits_renders_and_undoes_end_to_end() {
        let png = solid_png(16, 16, [100, 100, 100, 255]);
        let mut session = EditSession::new();
        let mut renderer = Renderer::new(BuiltinBackend);

        session.set_input(InputStage::from_bytes(png));
        let index = session.add_stage(AdjustmentStage::new(StageConfig::Resize {
            max_width: 8,
            max_height: 8,
        }));

        let small = session.render_full(&mut renderer).unwrap().unwrap();
        assert_eq!(small.dimensions(), Dimensions::new(8, 8));

        session.update_stage(index, StageConfig::Resize {
            max_width: 4,
            max_height: 4,
        });
        let smaller = session.render_full(&mut renderer).unwrap().unwrap();
        assert_eq!(smaller.dimensions(), Dimensions::new(4, 4));

        assert!(session.undo());
        let back = session.render_full(&mut renderer).unwrap().unwrap();
        assert_eq!(back.dimensions(), Dimensions::new(8, 8));
    }

    #[test]
    fn preview_and_export_disagree_only_on_scale() {
        let png = solid_png(64, 48, [200, 50, 50, 255]);
        let mut pipeline = Pipeline::new();
        pipeline.set_input(InputStage::from_bytes(png));
        pipeline.add_stage(AdjustmentStage::new(StageConfig::Invert));
        let mut renderer = Renderer::new(BuiltinBackend);

        let preview = pipeline
            .render_at_size(&mut renderer, Dimensions::new(32, 24))
            .unwrap()
            .unwrap();
        assert_eq!(preview.dimensions(), Dimensions::new(32, 24));

        let full = pipeline.render_full(&mut renderer).unwrap().unwrap();
        assert_eq!(full.dimensions(), Dimensions::new(64, 48));
        assert_eq!(full.pixels().get_pixel(0, 0).0, [55, 205, 205, 255]);
    }
}
