//! The built-in pixel backend: decoding and the stock adjustments.
//!
//! Everything here is a pure function from (source pixels, config) to
//! fresh pixels. Geometry stages size their output with
//! [`StageConfig::output_size`], the same prediction the rest of the
//! engine uses, so predicted and rendered dimensions are identical by
//! construction.
//!
//! Tone adjustments (gamma, curves) compile the mapping into a 256-entry
//! lookup table once per application, then map every channel through it.

use std::fs;

use image::{GrayImage, Rgba, imageops};

use crate::bitmap::Bitmap;
use crate::render::StageBackend;
use crate::stage::{AdjustmentStage, CurvePoint, InputSource, InputStage, StageConfig, clamp_crop};
use crate::types::{LoadError, RgbaImage, TransformError};

/// The backend used when no custom [`StageBackend`] is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl StageBackend for BuiltinBackend {
    fn load_input(&self, stage: &InputStage) -> Result<Bitmap, LoadError> {
        match stage.source() {
            InputSource::File { path } => {
                let bytes = fs::read(path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                decode(&bytes)
            }
            InputSource::Memory { bytes } => decode(bytes),
        }
    }

    fn apply(&self, stage: &AdjustmentStage, source: &Bitmap) -> Result<Bitmap, TransformError> {
        match stage.config() {
            StageConfig::Gamma { gamma } => apply_gamma(source, *gamma),
            StageConfig::Curves { points } => apply_curves(source, points),
            StageConfig::GrayscaleMixer { red, green, blue } => {
                apply_mixer(source, *red, *green, *blue)
            }
            StageConfig::Invert => Ok(apply_invert(source)),
            StageConfig::Blur { sigma } => apply_blur(source, *sigma),
            config @ (StageConfig::Resize { .. } | StageConfig::ViewScale { .. }) => {
                Ok(apply_scale(source, config))
            }
            StageConfig::Crop {
                x,
                y,
                width,
                height,
            } => Ok(apply_crop(source, *x, *y, *width, *height)),
            StageConfig::SolidBorder { thickness, color } => {
                Ok(apply_border(source, *thickness, *color))
            }
        }
    }
}

/// Decode raw bytes into an RGBA bitmap. Supports whatever formats the
/// `image` crate was built with (PNG, JPEG, BMP, WebP here).
fn decode(bytes: &[u8]) -> Result<Bitmap, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::EmptyInput);
    }
    let decoded = image::load_from_memory(bytes)?;
    Ok(Bitmap::new(decoded.to_rgba8()))
}

fn apply_gamma(source: &Bitmap, gamma: f64) -> Result<Bitmap, TransformError> {
    if !gamma.is_finite() || gamma <= 0.0 {
        return Err(TransformError::InvalidParams(format!(
            "gamma must be finite and positive, got {gamma}",
        )));
    }
    let exponent = 1.0 / gamma;
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let table: [u8; 256] = std::array::from_fn(|value| {
        let normalized = value as f64 / 255.0;
        (normalized.powf(exponent) * 255.0).round() as u8
    });
    Ok(map_channels(source, &table))
}

fn apply_curves(source: &Bitmap, points: &[CurvePoint]) -> Result<Bitmap, TransformError> {
    let table = curve_table(points)?;
    Ok(map_channels(source, &table))
}

/// Compile a piecewise-linear curve into a lookup table.
///
/// Control points are sorted by `x`; identity endpoints are supplied
/// where the curve does not reach the edges of the unit square.
fn curve_table(points: &[CurvePoint]) -> Result<[u8; 256], TransformError> {
    for point in points {
        let in_unit_square = point.x.is_finite()
            && point.y.is_finite()
            && (0.0..=1.0).contains(&point.x)
            && (0.0..=1.0).contains(&point.y);
        if !in_unit_square {
            return Err(TransformError::InvalidParams(format!(
                "curve points must lie in the unit square, got ({}, {})",
                point.x, point.y,
            )));
        }
    }

    let mut control = points.to_vec();
    control.sort_by(|a, b| a.x.total_cmp(&b.x));
    if control.first().is_none_or(|point| point.x > 0.0) {
        control.insert(0, CurvePoint { x: 0.0, y: 0.0 });
    }
    if control.last().is_none_or(|point| point.x < 1.0) {
        control.push(CurvePoint { x: 1.0, y: 1.0 });
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let table: [u8; 256] = std::array::from_fn(|value| {
        let t = value as f64 / 255.0;
        (curve_value(&control, t).clamp(0.0, 1.0) * 255.0).round() as u8
    });
    Ok(table)
}

/// Evaluate the curve at `t`. `control` is sorted, non-empty, and spans
/// `x` from 0 to 1.
fn curve_value(control: &[CurvePoint], t: f64) -> f64 {
    for pair in control.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t <= b.x {
            let dx = b.x - a.x;
            if dx <= f64::EPSILON {
                return b.y;
            }
            return a.y + (b.y - a.y) * (t - a.x) / dx;
        }
    }
    control.last().map_or(t, |point| point.y)
}

fn map_channels(source: &Bitmap, table: &[u8; 256]) -> Bitmap {
    let mut pixels = source.pixels().clone();
    for pixel in pixels.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        *pixel = Rgba([
            table[usize::from(r)],
            table[usize::from(g)],
            table[usize::from(b)],
            a,
        ]);
    }
    Bitmap::derived(source, pixels)
}

fn apply_mixer(source: &Bitmap, red: f64, green: f64, blue: f64) -> Result<Bitmap, TransformError> {
    if !(red.is_finite() && green.is_finite() && blue.is_finite()) {
        return Err(TransformError::InvalidParams(format!(
            "mixer weights must be finite, got ({red}, {green}, {blue})",
        )));
    }
    let mut pixels = source.pixels().clone();
    for pixel in pixels.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let level = f64::from(r) * red + f64::from(g) * green + f64::from(b) * blue;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = level.clamp(0.0, 255.0).round() as u8;
        *pixel = Rgba([level, level, level, a]);
    }
    Ok(Bitmap::derived(source, pixels))
}

fn apply_invert(source: &Bitmap) -> Bitmap {
    let mut pixels = source.pixels().clone();
    for pixel in pixels.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        *pixel = Rgba([255 - r, 255 - g, 255 - b, a]);
    }
    Bitmap::derived(source, pixels)
}

/// Blur all four channels independently. `imageproc`'s Gaussian only
/// accepts `GrayImage`, so the image is split, blurred per channel, and
/// reassembled; the result equals blurring in color space because the
/// Gaussian is linear and per-channel.
///
/// Non-positive sigma is an identity pass, since the underlying filter
/// panics on `sigma <= 0.0`.
fn apply_blur(source: &Bitmap, sigma: f64) -> Result<Bitmap, TransformError> {
    if !sigma.is_finite() {
        return Err(TransformError::InvalidParams(format!(
            "blur sigma must be finite, got {sigma}",
        )));
    }
    if sigma <= 0.0 {
        return Ok(Bitmap::derived(source, source.pixels().clone()));
    }
    #[allow(clippy::cast_possible_truncation)]
    let sigma = sigma as f32;

    let image = source.pixels();
    let (w, h) = (image.width(), image.height());
    let channels: [GrayImage; 4] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 4] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));
    let pixels = RgbaImage::from_fn(w, h, |x, y| {
        Rgba([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
            blurred[3].get_pixel(x, y).0[0],
        ])
    });
    Ok(Bitmap::derived(source, pixels))
}

fn apply_scale(source: &Bitmap, config: &StageConfig) -> Bitmap {
    let target = config.output_size(source.dimensions());
    if target == source.dimensions() {
        return Bitmap::derived(source, source.pixels().clone());
    }
    let pixels = imageops::resize(
        source.pixels(),
        target.width,
        target.height,
        imageops::FilterType::Triangle,
    );
    Bitmap::rescaled(source, pixels)
}

fn apply_crop(source: &Bitmap, x: u32, y: u32, width: u32, height: u32) -> Bitmap {
    let (x, y, extent) = clamp_crop(source.dimensions(), x, y, width, height);
    let pixels = imageops::crop_imm(source.pixels(), x, y, extent.width, extent.height).to_image();
    Bitmap::derived(source, pixels)
}

fn apply_border(source: &Bitmap, thickness: u32, color: [u8; 4]) -> Bitmap {
    let dims = source.dimensions();
    let margin = thickness.saturating_mul(2);
    let mut canvas = RgbaImage::from_pixel(
        dims.width.saturating_add(margin),
        dims.height.saturating_add(margin),
        Rgba(color),
    );
    imageops::replace(
        &mut canvas,
        source.pixels(),
        i64::from(thickness),
        i64::from(thickness),
    );
    Bitmap::derived(source, canvas)
}
