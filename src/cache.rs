//! # Screenshot Memory Cache
//!
//! Bounded in-memory working set of screenshots already seen this session,
//! so preview and review paths skip redundant decode/encode work.
//!
//! ## Eviction policy
//!
//! Eviction is **insertion-order**, not LRU: when the cache is at capacity,
//! the oldest-*inserted* entry is evicted regardless of how recently it was
//! read. This is a deliberate simplicity tradeoff — capture sessions insert
//! monotonically and mostly re-read the newest entries, so the bookkeeping
//! of access-order tracking buys little. Implementers expecting LRU should
//! note the difference before "fixing" it.
//!
//! Insertion evicts *before* exceeding the bound; the entry count never
//! passes `capacity`, not even transiently.
//!
//! Contents are process-local and lost on restart; the durable copy lives
//! behind the [`ScreenshotStore`](crate::store::ScreenshotStore) boundary.
//! All mutation happens under one mutex, so concurrent inserts cannot both
//! conclude they are the one crossing capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use log::trace;

use crate::compress::Compressor;
use crate::error::CaptureResult;
use crate::frame::CompressedImage;

struct CacheEntry {
    full: CompressedImage,
    thumbnail: Option<CompressedImage>,
}

struct CacheInner {
    entries: HashMap<u64, CacheEntry>,
    // Insertion order; front is the next eviction victim.
    order: VecDeque<u64>,
}

/// Process-wide cache of compressed screenshots, keyed by screenshot id.
pub struct ScreenshotCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ScreenshotCache {
    /// Create a cache holding at most `capacity` screenshots.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Insert a screenshot, evicting the oldest-inserted entry first if the
    /// cache is already full. Re-inserting an existing id replaces its
    /// content without changing its position in the eviction order.
    pub fn put(&self, id: u64, full: CompressedImage, thumbnail: Option<CompressedImage>) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if let Some(existing) = inner.entries.get_mut(&id) {
            existing.full = full;
            existing.thumbnail = thumbnail;
            return;
        }
        while inner.entries.len() >= self.capacity {
            if let Some(victim) = inner.order.pop_front() {
                inner.entries.remove(&victim);
                trace!("evicted screenshot {} from cache", victim);
            } else {
                break;
            }
        }
        inner.order.push_back(id);
        inner.entries.insert(id, CacheEntry { full, thumbnail });
    }

    /// Full-resolution image for `id`, if still cached.
    pub fn get(&self, id: u64) -> Option<CompressedImage> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.get(&id).map(|e| e.full.clone())
    }

    /// Thumbnail rendition for `id`, if one was stored.
    pub fn thumbnail(&self, id: u64) -> Option<CompressedImage> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.get(&id).and_then(|e| e.thumbnail.clone())
    }

    /// Drop one entry.
    pub fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if inner.entries.remove(&id).is_some() {
            inner.order.retain(|k| *k != id);
        }
    }

    /// Drop everything (session restart).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Produce a small preview rendition of `image`: longest edge capped at
/// `max_dimension`, bytes bounded by `target_bytes`. A specialization of the
/// compression engine, not a separate codec path.
pub fn derive_thumbnail(
    compressor: &Compressor,
    image: &CompressedImage,
    max_dimension: u32,
    target_bytes: usize,
) -> CaptureResult<CompressedImage> {
    compressor.shrink_to_fit(image, max_dimension, target_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Size;

    fn img(tag: u8) -> CompressedImage {
        CompressedImage {
            jpeg: vec![tag; 16],
            size: Size::new(4, 4),
            quality: 0.9,
        }
    }

    #[test]
    fn capacity_plus_one_evicts_first_inserted() {
        let cache = ScreenshotCache::new(3);
        for id in 1..=4u64 {
            cache.put(id, img(id as u8), None);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get(1).is_none());
        for id in 2..=4u64 {
            assert!(cache.get(id).is_some());
        }
    }

    #[test]
    fn eviction_ignores_access_recency() {
        let cache = ScreenshotCache::new(2);
        cache.put(1, img(1), None);
        cache.put(2, img(2), None);
        // Touch 1 repeatedly; insertion order still decides.
        for _ in 0..5 {
            assert!(cache.get(1).is_some());
        }
        cache.put(3, img(3), None);
        assert!(cache.get(1).is_none(), "oldest-inserted must be evicted");
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn interval_scenario_ids_one_two_three() {
        // capacity=2; after inserting 1, 2, 3 the cache holds exactly {2, 3}.
        let cache = ScreenshotCache::new(2);
        cache.put(1, img(1), None);
        cache.put(2, img(2), None);
        cache.put(3, img(3), None);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn thumbnail_tracked_with_entry() {
        let cache = ScreenshotCache::new(2);
        cache.put(7, img(7), Some(img(77)));
        assert_eq!(cache.thumbnail(7).unwrap().jpeg, vec![77u8; 16]);
        assert!(cache.thumbnail(8).is_none());
        cache.put(8, img(8), None);
        assert!(cache.thumbnail(8).is_none());
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let cache = ScreenshotCache::new(2);
        cache.put(1, img(1), None);
        cache.put(1, img(9), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).unwrap().jpeg, vec![9u8; 16]);
    }

    #[test]
    fn remove_and_clear() {
        let cache = ScreenshotCache::new(4);
        cache.put(1, img(1), None);
        cache.put(2, img(2), None);
        cache.remove(1);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        // Removed ids must not occupy eviction slots.
        for id in 10..14u64 {
            cache.put(id, img(id as u8), None);
        }
        assert_eq!(cache.len(), 4);
    }
}
