//! Decrypted attachment cache.
//!
//! Plaintext blobs are expensive to reproduce (presign, download,
//! double decrypt), so recently viewed attachments are kept in memory
//! under two independent budgets: an entry count and an aggregate byte
//! size. Either budget being exceeded evicts the least recently used
//! entries until both hold again.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use parking_lot::Mutex;

/// LRU cache of decrypted attachment bytes keyed by object key
///
/// All operations take the internal lock; callers never synchronize
/// externally. Values are [`Bytes`] so a hit is a cheap refcount clone,
/// not a copy.
pub struct LruAttachmentCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    max_entries: usize,
    max_total_bytes: usize,
    entries: HashMap<String, Bytes>,
    /// Front is least recently used
    order: VecDeque<String>,
    total_bytes: usize,
}

impl LruAttachmentCache {
    /// Cache bounded by `max_entries` values and `max_total_bytes` sum
    pub fn new(max_entries: usize, max_total_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                max_entries: max_entries.max(1),
                max_total_bytes,
                entries: HashMap::new(),
                order: VecDeque::new(),
                total_bytes: 0,
            }),
        }
    }

    /// Look up a blob, marking it most recently used
    pub fn get(&self, object_key: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let value = inner.entries.get(object_key)?.clone();
        inner.touch(object_key);
        Some(value)
    }

    /// Whether a blob is cached, without touching recency
    pub fn contains(&self, object_key: &str) -> bool {
        self.inner.lock().entries.contains_key(object_key)
    }

    /// Insert a blob, evicting least recently used entries as needed
    ///
    /// The count budget is restored first, then the byte budget; every
    /// eviction re-checks both. A blob larger than the whole byte
    /// budget is not cached at all.
    pub fn insert(&self, object_key: impl Into<String>, value: Bytes) {
        let object_key = object_key.into();
        let mut inner = self.inner.lock();

        if value.len() > inner.max_total_bytes {
            tracing::debug!(
                "Not caching {} ({} bytes exceeds the whole budget)",
                object_key,
                value.len()
            );
            return;
        }

        if let Some(old) = inner.entries.remove(&object_key) {
            inner.total_bytes -= old.len();
            inner.order.retain(|k| k != &object_key);
        }

        while inner.entries.len() >= inner.max_entries {
            if !inner.evict_oldest() {
                break;
            }
        }
        while inner.total_bytes + value.len() > inner.max_total_bytes {
            if !inner.evict_oldest() {
                break;
            }
        }

        inner.total_bytes += value.len();
        inner.entries.insert(object_key.clone(), value);
        inner.order.push_back(object_key);
    }

    /// Drop one entry
    pub fn remove(&self, object_key: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let value = inner.entries.remove(object_key)?;
        inner.total_bytes -= value.len();
        inner.order.retain(|k| k != object_key);
        Some(value)
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current sum of cached blob sizes
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn max_entries(&self) -> usize {
        self.inner.lock().max_entries
    }

    pub fn max_total_bytes(&self) -> usize {
        self.inner.lock().max_total_bytes
    }
}

impl CacheInner {
    fn touch(&mut self, object_key: &str) {
        self.order.retain(|k| k != object_key);
        self.order.push_back(object_key.to_string());
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.order.pop_front() else {
            return false;
        };
        if let Some(value) = self.entries.remove(&oldest) {
            self.total_bytes -= value.len();
        }
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn blob(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = LruAttachmentCache::new(4, 1024);
        cache.insert("a", blob(10));
        assert_eq!(cache.get("a").unwrap().len(), 10);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn test_count_bound_evicts_lru() {
        let cache = LruAttachmentCache::new(2, 1024);
        cache.insert("a", blob(1));
        cache.insert("b", blob(1));
        // Touch "a" so "b" is now the oldest
        cache.get("a");
        cache.insert("c", blob(1));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_byte_bound_evicts_until_fit() {
        let cache = LruAttachmentCache::new(10, 100);
        cache.insert("a", blob(40));
        cache.insert("b", blob(40));
        // 40 + 40 + 50 > 100 evicts both older entries
        cache.insert("c", blob(50));

        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.total_bytes(), 50);
    }

    #[test]
    fn test_reinsert_replaces_bytes() {
        let cache = LruAttachmentCache::new(4, 1024);
        cache.insert("a", blob(100));
        cache.insert("a", blob(7));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 7);
        assert_eq!(cache.get("a").unwrap().len(), 7);
    }

    #[test]
    fn test_oversized_blob_not_cached() {
        let cache = LruAttachmentCache::new(4, 100);
        cache.insert("small", blob(10));
        cache.insert("huge", blob(101));

        assert!(!cache.contains("huge"));
        // Existing entries survive the refused insert
        assert!(cache.contains("small"));
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = LruAttachmentCache::new(4, 1024);
        cache.insert("a", blob(10));
        cache.insert("b", blob(20));

        assert_eq!(cache.remove("a").unwrap().len(), 10);
        assert_eq!(cache.total_bytes(), 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_concurrent_access_keeps_bounds() {
        let cache = Arc::new(LruAttachmentCache::new(8, 8 * 64));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{}-{}", t, i);
                    cache.insert(key.clone(), Bytes::from(vec![0u8; 64]));
                    cache.get(&key);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 8);
        assert!(cache.total_bytes() <= 8 * 64);
    }
}
