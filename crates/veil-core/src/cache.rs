//! Bounded TTL response cache shared across requests.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::fetch::OriginResponse;

/// Cache collaborator handed to the proxy engine.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<OriginResponse>;
    fn set(&self, key: &str, value: OriginResponse, ttl: Duration);
    fn clear(&self);
    fn stats(&self) -> CacheStats;
}

/// Point-in-time counters, served by the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    touched: Instant,
}

/// Map with a per-entry TTL and a fixed entry count.
///
/// When full, expired entries are purged first, then the least recently
/// touched entry is evicted.
pub struct TtlCache<V> {
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_value(&self, key: &str) -> Option<V> {
        let found = self.lookup(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let mut map = self.entries.lock().ok()?;
        let now = Instant::now();
        let fresh = map.get(key).map(|e| e.expires_at > now)?;
        if !fresh {
            map.remove(key);
            return None;
        }
        let entry = map.get_mut(key)?;
        entry.touched = now;
        Some(entry.value.clone())
    }

    pub fn set_value(&self, key: &str, value: V, ttl: Duration) {
        if self.max_entries == 0 {
            return;
        }
        let Ok(mut map) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        if !map.contains_key(key) && map.len() >= self.max_entries {
            map.retain(|_, e| e.expires_at > now);
            if map.len() >= self.max_entries {
                let oldest = map
                    .iter()
                    .min_by_key(|(_, e)| e.touched)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    map.remove(&k);
                }
            }
        }
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
                touched: now,
            },
        );
    }

    /// Drops every entry; the hit/miss counters keep running.
    pub fn clear_all(&self) {
        if let Ok(mut map) = self.entries.lock() {
            map.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl ResponseCache for TtlCache<OriginResponse> {
    fn get(&self, key: &str) -> Option<OriginResponse> {
        self.get_value(key)
    }

    fn set(&self, key: &str, value: OriginResponse, ttl: Duration) {
        self.set_value(key, value, ttl)
    }

    fn clear(&self) {
        self.clear_all()
    }

    fn stats(&self) -> CacheStats {
        TtlCache::stats(self)
    }
}
