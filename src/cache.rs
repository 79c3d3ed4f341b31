//! Small TTL cache for derived aggregates. Entries are invalidated
//! explicitly by the writes that affect them; the TTL bounds staleness for
//! anything that slips through.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct TtlCache<K, V> {
    entries: DashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K, max_age: Duration) -> Option<V> {
        {
            let hit = self.entries.get(key)?;
            let (stored_at, value) = hit.value();
            if stored_at.elapsed() <= max_age {
                return Some(value.clone());
            }
        }
        // Stale: evict outside the read guard.
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}

impl<K: Eq + Hash, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
