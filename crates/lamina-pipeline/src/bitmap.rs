//! Bitmap handles: immutable pixel buffers with explicit identity.
//!
//! Stage evaluation produces a fresh [`Bitmap`] per result and shares it
//! as a reference-counted [`SharedBitmap`]. The cache partitions
//! downstream results on a bitmap's *identity*, never its content: two
//! pixel-identical bitmaps from different evaluations are distinct cache
//! keys. [`BitmapId`] makes that identity explicit and allocation-proof:
//! ids come from a process-wide counter and are never reused, so a
//! retired bitmap's cache entries cannot be revived by an unrelated
//! allocation landing at the same address.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;

use crate::types::Dimensions;

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity token for a [`Bitmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitmapId(u64);

impl BitmapId {
    fn next() -> Self {
        Self(NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BitmapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bitmap#{}", self.0)
    }
}

/// An immutable pixel buffer produced by one pipeline stage.
///
/// Carries the pixel scale: how many source-image pixels one pixel of
/// this bitmap represents along each axis (1.0 for a freshly loaded
/// input, 2.0 after halving, and so on). Scaling stages recompute it via
/// [`Bitmap::rescaled`]; every other stage inherits it via
/// [`Bitmap::derived`].
///
/// Deliberately not `Clone`: cloning would have to mint a new identity,
/// which is what [`SharedBitmap`] reference counting exists to avoid.
#[derive(Debug)]
pub struct Bitmap {
    id: BitmapId,
    pixels: RgbaImage,
    pixel_scale: f64,
}

/// A shared, reference-counted bitmap handle.
///
/// Dropping the last strong handle retires the bitmap's identity; any
/// cache entries keyed to it become unreachable and are pruned.
pub type SharedBitmap = Arc<Bitmap>;

impl Bitmap {
    /// Wrap freshly loaded pixels with a pixel scale of 1.0.
    #[must_use]
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            id: BitmapId::next(),
            pixels,
            pixel_scale: 1.0,
        }
    }

    /// Wrap a stage result that kept the source's pixel density
    /// (color work, crops, borders). The new bitmap inherits the
    /// source's pixel scale unchanged.
    #[must_use]
    pub fn derived(source: &Self, pixels: RgbaImage) -> Self {
        Self {
            id: BitmapId::next(),
            pixels,
            pixel_scale: source.pixel_scale,
        }
    }

    /// Wrap a stage result that resampled the source. The pixel scale is
    /// recomputed from the width ratio; a degenerate zero-width result
    /// inherits the source's scale instead.
    #[must_use]
    pub fn rescaled(source: &Self, pixels: RgbaImage) -> Self {
        let pixel_scale = if pixels.width() == 0 {
            source.pixel_scale
        } else {
            source.pixel_scale * f64::from(source.pixels.width()) / f64::from(pixels.width())
        };
        Self {
            id: BitmapId::next(),
            pixels,
            pixel_scale,
        }
    }

    /// This bitmap's identity token.
    #[must_use]
    pub const fn id(&self) -> BitmapId {
        self.id
    }

    /// The pixel data.
    #[must_use]
    pub const fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Source pixels represented by one pixel of this bitmap.
    #[must_use]
    pub const fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.pixels.width(), self.pixels.height())
    }

    /// Convert into a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedBitmap {
        Arc::new(self)
    }
}
