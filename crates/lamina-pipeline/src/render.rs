//! The rendering seam: a pixel backend behind a memoizing front.
//!
//! [`StageBackend`] is the only place pixels are decoded or touched.
//! [`Renderer`] wraps a backend with the [`BitmapCache`]: input stages
//! are keyed by their serialized source, adjustment stages by the
//! identity of the bitmap they consume plus their serialized config.
//!
//! Backends must be pure: for one input bitmap and one configuration,
//! the same pixels come out every time. The cache is invisible exactly
//! as long as that holds.

use crate::bitmap::{Bitmap, SharedBitmap};
use crate::cache::{BitmapCache, config_key};
use crate::stage::{AdjustmentStage, InputStage};
use crate::types::{CacheConfig, Dimensions, LoadError, TransformError};

/// Decodes inputs and applies adjustment configurations to pixels.
pub trait StageBackend {
    /// Decode the bitmap an input stage describes.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] when the source cannot be read or
    /// decoded.
    fn load_input(&self, stage: &InputStage) -> Result<Bitmap, LoadError>;

    /// Apply one adjustment to a source bitmap, producing a fresh
    /// bitmap.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] when the configuration is invalid
    /// or the transform cannot run.
    fn apply(&self, stage: &AdjustmentStage, source: &Bitmap) -> Result<Bitmap, TransformError>;
}

/// A [`StageBackend`] with result memoization in front of it.
#[derive(Debug)]
pub struct Renderer<B> {
    backend: B,
    cache: BitmapCache,
}

impl<B: StageBackend> Renderer<B> {
    /// Wrap a backend with a default-sized cache.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: BitmapCache::new(),
        }
    }

    /// Wrap a backend with an explicitly sized cache.
    #[must_use]
    pub fn with_config(backend: B, config: &CacheConfig) -> Self {
        Self {
            backend,
            cache: BitmapCache::with_config(config),
        }
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Drop every memoized bitmap.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// The decoded bitmap for an input stage, loading on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] when loading or decoding fails; failures
    /// are not cached, so a later call retries.
    pub fn input_bitmap(&mut self, stage: &InputStage) -> Result<SharedBitmap, LoadError> {
        let key = config_key(stage.source());
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get_input(key) {
                return Ok(hit);
            }
        }
        let loaded = self.backend.load_input(stage)?.into_shared();
        if let Some(key) = key {
            self.cache.put_input(key, SharedBitmap::clone(&loaded));
        }
        Ok(loaded)
    }

    /// The dimensions an input stage decodes to.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] when loading or decoding fails.
    pub fn input_size(&mut self, stage: &InputStage) -> Result<Dimensions, LoadError> {
        Ok(self.input_bitmap(stage)?.dimensions())
    }

    /// Run one adjustment over a source bitmap, consulting the cache.
    ///
    /// A failing stage logs a warning and passes its input through
    /// unchanged, so one bad configuration degrades the picture instead
    /// of killing the whole evaluation. Pass-through results are never
    /// cached.
    pub fn apply(&mut self, source: &SharedBitmap, stage: &AdjustmentStage) -> SharedBitmap {
        let key = config_key(stage.config());
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(source, key) {
                return hit;
            }
        }
        match self.backend.apply(stage, source) {
            Ok(result) => {
                let result = result.into_shared();
                if let Some(key) = key {
                    self.cache.put(source, key, SharedBitmap::clone(&result));
                }
                result
            }
            Err(error) => {
                log::warn!(
                    "stage '{}' failed, passing its input through: {error}",
                    stage.name(),
                );
                SharedBitmap::clone(source)
            }
        }
    }
}
