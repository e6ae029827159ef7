//! In-memory cache store with failure injection.
//!
//! Used by tests to exercise the "cache is advisory" rules, and by hosts
//! that want the engine's fallback chain without a durable file.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::CacheStore;

/// `HashMap`-backed [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` behave as a miss.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make every subsequent `set` a dropped write.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |map| map.len())
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        if self.fail_reads.load(Ordering::Relaxed) {
            tracing::warn!(key, "injected cache read failure; treating as miss");
            return None;
        }
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if self.fail_writes.load(Ordering::Relaxed) {
            tracing::warn!(key, "injected cache write failure; dropping");
            return;
        }
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_overwrite() {
        let store = MemoryCacheStore::new();
        store.set("k", "v1");
        store.set("k", "v2");
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn injected_read_failure_is_a_miss() {
        let store = MemoryCacheStore::new();
        store.set("k", "v");

        store.fail_reads(true);
        assert!(store.get("k").is_none());

        store.fail_reads(false);
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn injected_write_failure_drops_silently() {
        let store = MemoryCacheStore::new();
        store.fail_writes(true);
        store.set("k", "v");
        store.fail_writes(false);
        assert!(store.get("k").is_none());
    }
}
