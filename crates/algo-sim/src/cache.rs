//! Short-lived cache of gathered context, keyed by subject.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::CacheSettings;

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

/// Subject -> context text, with TTL expiry and a hard size cap.
///
/// Reads use `peek`, so the underlying LRU order is insertion order and the
/// capacity bound evicts the oldest insertion first.
pub struct ContextCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(Duration::from_secs(settings.ttl_secs), settings.max_entries)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.put_at(key.into(), value.into(), Instant::now());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = self.entries.lock();
        Self::cleanup(&mut entries, self.ttl, now);
        entries.peek(key).map(|entry| entry.value.clone())
    }

    pub(crate) fn put_at(&self, key: String, value: String, now: Instant) {
        let mut entries = self.entries.lock();
        Self::cleanup(&mut entries, self.ttl, now);
        entries.put(key, CacheEntry { value, inserted_at: now });
    }

    fn cleanup(entries: &mut LruCache<String, CacheEntry>, ttl: Duration, now: Instant) {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.inserted_at) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            entries.pop(&key);
        }
    }
}
