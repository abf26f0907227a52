//! Client-side bitmap cache: three tiers of keyed slots with LRU eviction.
//!
//! Entries are addressed two ways: by the server-assigned
//! `(cache_id, cache_index)` pair, and by the 64-bit content key
//! `(key1, key2)`. Each tier is a fixed-capacity slot arena threaded with an
//! intrusive LRU list, plus two side maps resolving either address to a slot.

use std::collections::HashMap;

use tracing::warn;

/// Default tier capacities, matching the advertised bitmap cache capability.
pub const DEFAULT_TIER_CAPACITIES: [usize; 3] = [600, 300, 100];

/// A decoded bitmap held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBitmap {
    pub width: u16,
    pub height: u16,
    pub bpp: u8,
    pub data: Vec<u8>,
}

/// Per-tier statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry {
    cache_index: u16,
    key: (u32, u32),
    bitmap: CachedBitmap,
}

#[derive(Debug, Default)]
struct Slot {
    prev: Option<usize>,
    next: Option<usize>,
    entry: Option<Entry>,
}

#[derive(Debug)]
struct Tier {
    slots: Vec<Slot>,
    by_index: HashMap<u16, usize>,
    by_key: HashMap<(u32, u32), usize>,
    /// Most recently used slot.
    head: Option<usize>,
    /// Least recently used slot; the eviction victim.
    tail: Option<usize>,
    free: Vec<usize>,
    hits: u64,
    misses: u64,
}

impl Tier {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);

        Self {
            slots,
            by_index: HashMap::new(),
            by_key: HashMap::new(),
            head: None,
            tail: None,
            free: (0..capacity).rev().collect(),
            hits: 0,
            misses: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        self.capacity() - self.free.len()
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);

        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }

        self.slots[slot].prev = None;
        self.slots[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = None;
        self.slots[slot].next = self.head;

        if let Some(old_head) = self.head {
            self.slots[old_head].prev = Some(slot);
        }

        self.head = Some(slot);

        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn touch(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    fn remove_entry(&mut self, slot: usize) {
        if let Some(entry) = self.slots[slot].entry.take() {
            self.by_index.remove(&entry.cache_index);
            if self.by_key.get(&entry.key) == Some(&slot) {
                self.by_key.remove(&entry.key);
            }
        }
        self.unlink(slot);
        self.free.push(slot);
    }

    fn insert(&mut self, cache_index: u16, key: (u32, u32), bitmap: CachedBitmap) {
        if let Some(&slot) = self.by_key.get(&key) {
            let existing = self.slots[slot].entry.as_ref().expect("indexed slot is occupied");
            if existing.bitmap != bitmap {
                // The content key is supposed to identify the bytes; some
                // servers reuse keys anyway. Evict the stale entry rather
                // than trusting the key (log-and-evict).
                warn!(key1 = key.0, key2 = key.1, "Bitmap content key reused with different data, evicting stale entry");
                self.remove_entry(slot);
            }
        }

        let slot = if let Some(&slot) = self.by_index.get(&cache_index) {
            // The server overwrites this index in place.
            if let Some(old) = self.slots[slot].entry.take() {
                if self.by_key.get(&old.key) == Some(&slot) {
                    self.by_key.remove(&old.key);
                }
            }
            self.unlink(slot);
            slot
        } else if let Some(slot) = self.free.pop() {
            slot
        } else {
            let victim = self.tail.expect("full cache has a tail");
            self.remove_entry(victim);
            self.free.pop().expect("remove_entry freed a slot")
        };

        self.slots[slot].entry = Some(Entry {
            cache_index,
            key,
            bitmap,
        });
        self.by_index.insert(cache_index, slot);
        self.by_key.insert(key, slot);

        self.push_front(slot);
    }

    fn lookup(&mut self, cache_index: u16, key: (u32, u32)) -> Option<&CachedBitmap> {
        let slot = self.by_index.get(&cache_index).or_else(|| self.by_key.get(&key)).copied();

        match slot {
            Some(slot) => {
                self.hits += 1;
                self.touch(slot);
                self.slots[slot].entry.as_ref().map(|entry| &entry.bitmap)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.capacity(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// The three-tier bitmap cache.
#[derive(Debug)]
pub struct BitmapCache {
    tiers: Vec<Tier>,
}

impl BitmapCache {
    pub fn new(capacities: &[usize]) -> Self {
        Self {
            tiers: capacities.iter().map(|&capacity| Tier::new(capacity)).collect(),
        }
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Stores a decoded bitmap under both its addresses. Out-of-range cache
    /// ids are logged and dropped; the server is confused, not us.
    pub fn insert(&mut self, cache_id: u8, cache_index: u16, key: (u32, u32), bitmap: CachedBitmap) {
        match self.tiers.get_mut(usize::from(cache_id)) {
            Some(tier) => tier.insert(cache_index, key, bitmap),
            None => warn!(cache_id, "Bitmap cache id out of range, entry dropped"),
        }
    }

    /// Looks an entry up by `(cache_id, cache_index)` first, then by content
    /// key, refreshing its LRU position on a hit.
    pub fn lookup(&mut self, cache_id: u8, cache_index: u16, key: (u32, u32)) -> Option<&CachedBitmap> {
        match self.tiers.get_mut(usize::from(cache_id)) {
            Some(tier) => tier.lookup(cache_index, key),
            None => None,
        }
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        self.tiers.iter().map(Tier::stats).collect()
    }
}

impl Default for BitmapCache {
    fn default() -> Self {
        Self::new(&DEFAULT_TIER_CAPACITIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(tag: u8) -> CachedBitmap {
        CachedBitmap {
            width: 4,
            height: 4,
            bpp: 24,
            data: vec![tag; 48],
        }
    }

    #[test]
    fn lookup_by_index_and_by_key() {
        let mut cache = BitmapCache::new(&[4]);
        cache.insert(0, 7, (0xAABB_CCDD, 0x1122_3344), bitmap(1));

        assert_eq!(cache.lookup(0, 7, (0, 0)).unwrap().data, vec![1; 48]);
        assert_eq!(cache.lookup(0, 999, (0xAABB_CCDD, 0x1122_3344)).unwrap().data, vec![1; 48]);
        assert!(cache.lookup(0, 999, (1, 1)).is_none());
    }

    #[test]
    fn identical_keys_return_identical_bytes() {
        let mut cache = BitmapCache::new(&[4]);
        cache.insert(0, 0, (1, 2), bitmap(9));
        cache.insert(0, 1, (5, 6), bitmap(7));

        let first = cache.lookup(0, 0, (1, 2)).unwrap().data.clone();
        let second = cache.lookup(0, 99, (1, 2)).unwrap().data.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn capacity_is_never_exceeded_and_lru_is_evicted() {
        let mut cache = BitmapCache::new(&[3]);

        for i in 0..3u16 {
            cache.insert(0, i, (u32::from(i), 0), bitmap(i as u8));
        }

        // Touch entry 0 so entry 1 becomes the LRU.
        assert!(cache.lookup(0, 0, (0, 0)).is_some());

        cache.insert(0, 3, (3, 0), bitmap(3));

        assert_eq!(cache.stats()[0].entries, 3);
        assert!(cache.lookup(0, 1, (1, 0)).is_none(), "LRU entry must be evicted");
        assert!(cache.lookup(0, 0, (0, 0)).is_some());
        assert!(cache.lookup(0, 3, (3, 0)).is_some());
    }

    #[test]
    fn reused_index_replaces_in_place() {
        let mut cache = BitmapCache::new(&[2]);
        cache.insert(0, 0, (1, 1), bitmap(1));
        cache.insert(0, 0, (2, 2), bitmap(2));

        assert_eq!(cache.stats()[0].entries, 1);
        assert_eq!(cache.lookup(0, 0, (0, 0)).unwrap().data, vec![2; 48]);
        assert!(cache.lookup(0, 42, (1, 1)).is_none());
    }

    #[test]
    fn reused_content_key_evicts_stale_entry() {
        let mut cache = BitmapCache::new(&[4]);
        cache.insert(0, 0, (1, 1), bitmap(1));
        cache.insert(0, 1, (1, 1), bitmap(2));

        // The key must resolve to the fresh bytes, never the stale ones.
        assert_eq!(cache.lookup(0, 42, (1, 1)).unwrap().data, vec![2; 48]);
    }

    #[test]
    fn hit_rate_is_tracked_per_tier() {
        let mut cache = BitmapCache::new(&[2, 2, 2]);
        cache.insert(1, 0, (1, 1), bitmap(1));

        assert!(cache.lookup(1, 0, (1, 1)).is_some());
        assert!(cache.lookup(1, 5, (9, 9)).is_none());

        let stats = cache.stats();
        assert_eq!(stats[1].hits, 1);
        assert_eq!(stats[1].misses, 1);
        assert!((stats[1].hit_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats[0].hits + stats[0].misses, 0);
    }
}
