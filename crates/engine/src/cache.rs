//! Rendered page cache with LRU eviction
//!
//! Holds page bitmaps up to a byte budget. Cache misses are normal and
//! never errors; callers render on demand.

use crate::{DocumentHandle, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one rendering of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub handle: DocumentHandle,
    pub page_index: u32,
    /// Render scale in thousandths, so nearby floats share an entry
    pub scale_milli: u32,
}

impl PageKey {
    pub fn new(handle: DocumentHandle, page_index: u32, scale: f32) -> Self {
        Self { handle, page_index, scale_milli: (scale.max(0.0) * 1000.0).round() as u32 }
    }

    pub fn scale(&self) -> f32 {
        self.scale_milli as f32 / 1000.0
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub page_count: usize,
    pub memory_used: usize,
    pub memory_limit: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate, 0.0 to 1.0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    pages: HashMap<PageKey, Arc<RgbaImage>>,
    /// Most recently used at the back
    lru_queue: VecDeque<PageKey>,
    memory_used: usize,
    memory_limit: usize,
    stats: CacheStats,
}

fn image_size(image: &RgbaImage) -> usize {
    image.as_raw().len()
}

impl CacheState {
    fn touch(&mut self, key: PageKey) {
        self.lru_queue.retain(|k| *k != key);
        self.lru_queue.push_back(key);
    }

    fn remove(&mut self, key: &PageKey) -> Option<Arc<RgbaImage>> {
        let image = self.pages.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.memory_used = self.memory_used.saturating_sub(image_size(&image));
        Some(image)
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.memory_used + required > self.memory_limit {
            let Some(key) = self.lru_queue.pop_front() else {
                break;
            };
            if let Some(image) = self.pages.remove(&key) {
                self.memory_used = self.memory_used.saturating_sub(image_size(&image));
                self.stats.evictions += 1;
            }
        }
    }

    fn refresh_stats(&mut self) {
        self.stats.page_count = self.pages.len();
        self.stats.memory_used = self.memory_used;
        self.stats.memory_limit = self.memory_limit;
    }
}

/// Thread-safe page bitmap cache; clones share the same storage
#[derive(Clone)]
pub struct PageCache {
    state: Arc<Mutex<CacheState>>,
}

impl PageCache {
    pub fn new(memory_limit: usize) -> Self {
        let state = CacheState {
            pages: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats { memory_limit, ..CacheStats::default() },
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn with_limit_mb(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &PageKey) -> Option<Arc<RgbaImage>> {
        let mut state = self.lock();
        match state.pages.get(key).cloned() {
            Some(image) => {
                state.touch(*key);
                state.stats.hits += 1;
                Some(image)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.lock().pages.contains_key(key)
    }

    /// Insert a page, evicting least recently used pages to stay in budget
    ///
    /// Returns `false` when the image alone exceeds the budget.
    pub fn put(&self, key: PageKey, image: RgbaImage) -> bool {
        let size = image_size(&image);
        let mut state = self.lock();
        if size > state.memory_limit {
            return false;
        }
        state.remove(&key);
        state.evict_to_fit(size);
        state.pages.insert(key, Arc::new(image));
        state.touch(key);
        state.memory_used += size;
        state.refresh_stats();
        true
    }

    pub fn remove(&self, key: &PageKey) -> bool {
        let mut state = self.lock();
        let removed = state.remove(key).is_some();
        state.refresh_stats();
        removed
    }

    /// Drop every page of a closed document
    pub fn remove_document(&self, handle: DocumentHandle) -> usize {
        let mut state = self.lock();
        let keys: Vec<PageKey> = state.pages.keys().filter(|k| k.handle == handle).copied().collect();
        for key in &keys {
            state.remove(key);
        }
        state.refresh_stats();
        keys.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.pages.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.refresh_stats();
    }

    pub fn stats(&self) -> CacheStats {
        let mut state = self.lock();
        state.refresh_stats();
        state.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const HANDLE: DocumentHandle = DocumentHandle(1);

    /// 10x10 RGBA page, 400 bytes
    fn page() -> RgbaImage {
        RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn test_put_get_and_stats() {
        let cache = PageCache::new(1000);
        let key = PageKey::new(HANDLE, 0, 1.0);
        assert!(cache.put(key, page()));

        assert!(cache.get(&key).is_some());
        assert!(cache.get(&PageKey::new(HANDLE, 1, 1.0)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.page_count, 1);
        assert_eq!(stats.memory_used, 400);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = PageCache::new(800);
        let first = PageKey::new(HANDLE, 0, 1.0);
        let second = PageKey::new(HANDLE, 1, 1.0);
        let third = PageKey::new(HANDLE, 2, 1.0);
        cache.put(first, page());
        cache.put(second, page());

        // Touch the first page so the second becomes the eviction candidate
        cache.get(&first);
        cache.put(third, page());

        assert!(cache.contains(&first));
        assert!(!cache.contains(&second));
        assert!(cache.contains(&third));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_image_is_refused() {
        let cache = PageCache::new(100);
        assert!(!cache.put(PageKey::new(HANDLE, 0, 1.0), page()));
        assert_eq!(cache.stats().page_count, 0);
    }

    #[test]
    fn test_scale_is_part_of_key() {
        let cache = PageCache::new(10_000);
        cache.put(PageKey::new(HANDLE, 0, 1.0), page());
        assert!(cache.contains(&PageKey::new(HANDLE, 0, 1.0004)));
        assert!(!cache.contains(&PageKey::new(HANDLE, 0, 2.0)));
    }

    #[test]
    fn test_remove_document() {
        let cache = PageCache::new(10_000);
        cache.put(PageKey::new(HANDLE, 0, 1.0), page());
        cache.put(PageKey::new(HANDLE, 1, 1.0), page());
        cache.put(PageKey::new(DocumentHandle(2), 0, 1.0), page());

        assert_eq!(cache.remove_document(HANDLE), 2);
        assert_eq!(cache.stats().page_count, 1);
        assert_eq!(cache.stats().memory_used, 400);

        cache.clear();
        assert_eq!(cache.stats().memory_used, 0);
    }
}
