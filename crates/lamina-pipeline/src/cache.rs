//! Two-tier memoization of stage results.
//!
//! The cache has two partitions. The *input* partition maps a
//! serialized input configuration to its decoded bitmap, bounded by a
//! small LRU. The *adjustment* partition is keyed first by the identity
//! of the upstream bitmap a stage consumed, then by the stage's
//! serialized configuration; the per-upstream sub-caches hang off
//! [`Weak`] references, so when an upstream bitmap is dropped every
//! result derived from it becomes unreachable in one step and is pruned
//! on the next insertion. A small keep-alive ring holds strong
//! references to recently consumed upstream bitmaps so their sub-caches
//! survive ordinary churn, like toggling a stage off and back on.
//!
//! Cache keys are the serde_json rendering of a stage's configuration.
//! A configuration that fails to serialize (a non-finite float smuggled
//! in, say) simply renders uncached.

use std::collections::{HashMap, VecDeque};
use std::sync::Weak;

use serde::Serialize;

use crate::bitmap::{Bitmap, BitmapId, SharedBitmap};
use crate::types::CacheConfig;

pub(crate) type CacheKey = String;

/// Serialize a configuration into its cache key. `None` means the
/// config cannot be keyed and its result must not be cached.
pub(crate) fn config_key<T: Serialize>(config: &T) -> Option<CacheKey> {
    match serde_json::to_string(config) {
        Ok(key) => Some(key),
        Err(error) => {
            log::warn!("stage config is not cacheable: {error}");
            None
        }
    }
}

#[derive(Debug)]
struct LruEntry<V> {
    stamp: u64,
    value: V,
}

/// A minimal least-recently-used map. Eviction scans for the oldest
/// stamp; capacities here are single digits to low tens, so the scan
/// is cheaper than maintaining an ordered index.
#[derive(Debug)]
pub(crate) struct LruMap<K, V> {
    capacity: usize,
    clock: u64,
    entries: HashMap<K, LruEntry<V>>,
}

impl<K: Eq + std::hash::Hash + Clone, V> LruMap<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        entry.stamp = clock;
        Some(&entry.value)
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        self.clock += 1;
        let stamp = self.clock;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.stamp = stamp;
            entry.value = value;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, LruEntry { stamp, value });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stamp)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Strong references to the most recently consumed upstream bitmaps.
///
/// Without this, replacing a pipeline's intermediate result would
/// immediately drop the old bitmap and orphan its whole sub-cache,
/// making undo of the replacement a full re-render.
#[derive(Debug)]
pub(crate) struct KeepAliveRing {
    capacity: usize,
    ring: VecDeque<SharedBitmap>,
}

impl KeepAliveRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: VecDeque::new(),
        }
    }

    pub(crate) fn touch(&mut self, bitmap: &SharedBitmap) {
        if self.capacity == 0 {
            return;
        }
        self.ring.retain(|held| held.id() != bitmap.id());
        self.ring.push_back(SharedBitmap::clone(bitmap));
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.ring.clear();
    }
}

#[derive(Debug)]
struct WeakKeyEntry<V> {
    key: Weak<Bitmap>,
    value: V,
}

/// A map whose keys are bitmaps held only weakly.
///
/// Entries whose bitmap has been dropped are pruned lazily on the next
/// insertion. Lookups key on [`BitmapId`], so a caller holding a strong
/// handle always finds its own entry without an upgrade.
#[derive(Debug)]
pub(crate) struct WeakKeyMap<V> {
    entries: HashMap<BitmapId, WeakKeyEntry<V>>,
    keep_alive: KeepAliveRing,
}

impl<V> WeakKeyMap<V> {
    pub(crate) fn new(keep_alive: usize) -> Self {
        Self {
            entries: HashMap::new(),
            keep_alive: KeepAliveRing::new(keep_alive),
        }
    }

    pub(crate) fn get_mut(&mut self, key: &SharedBitmap) -> Option<&mut V> {
        let entry = self.entries.get_mut(&key.id())?;
        self.keep_alive.touch(key);
        Some(&mut entry.value)
    }

    pub(crate) fn get_or_insert_with(
        &mut self,
        key: &SharedBitmap,
        make: impl FnOnce() -> V,
    ) -> &mut V {
        self.prune();
        self.keep_alive.touch(key);
        let entry = self
            .entries
            .entry(key.id())
            .or_insert_with(|| WeakKeyEntry {
                key: SharedBitmap::downgrade(key),
                value: make(),
            });
        &mut entry.value
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.keep_alive.clear();
    }

    fn prune(&mut self) {
        self.entries
            .retain(|_, entry| entry.key.strong_count() > 0);
    }
}

/// The pipeline's result cache.
#[derive(Debug)]
pub struct BitmapCache {
    inputs: LruMap<CacheKey, SharedBitmap>,
    stages: WeakKeyMap<LruMap<CacheKey, SharedBitmap>>,
    stage_capacity: usize,
}

impl BitmapCache {
    /// A cache with default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// A cache sized per the given configuration.
    #[must_use]
    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            inputs: LruMap::new(config.input_capacity),
            stages: WeakKeyMap::new(config.keep_alive),
            stage_capacity: config.stage_capacity,
        }
    }

    /// Drop every cached bitmap in both partitions.
    pub fn clear(&mut self) {
        self.inputs.clear();
        self.stages.clear();
    }

    pub(crate) fn get_input(&mut self, key: &CacheKey) -> Option<SharedBitmap> {
        self.inputs.get(key).cloned()
    }

    pub(crate) fn put_input(&mut self, key: CacheKey, bitmap: SharedBitmap) {
        self.inputs.insert(key, bitmap);
    }

    pub(crate) fn get(&mut self, source: &SharedBitmap, key: &CacheKey) -> Option<SharedBitmap> {
        self.stages.get_mut(source)?.get(key).cloned()
    }

    pub(crate) fn put(&mut self, source: &SharedBitmap, key: CacheKey, bitmap: SharedBitmap) {
        let capacity = self.stage_capacity;
        self.stages
            .get_or_insert_with(source, || LruMap::new(capacity))
            .insert(key, bitmap);
    }
}

impl Default for BitmapCache {
    fn default() -> Self {
        Self::new()
    }
}
