//! Bounded in-memory cache with per-entry expiry and LRU eviction.
//!
//! Used for the search engine's query memo and the cache manager's
//! short-lived snapshot layer. Entries older than the TTL are treated as
//! absent and dropped on access. When full, inserting a new key evicts the
//! least-recently-used entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    clock: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            clock: 0,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }

        self.clock += 1;
        let tick = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        })
    }

    fn insert_at(&mut self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) {
            self.purge_expired(now);
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }
        self.clock += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: self.clock,
            },
        );
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) <= ttl);
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including any not yet purged after expiry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
