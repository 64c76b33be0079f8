//! A small injected cache that reports whether an entry is still fresh.
//!
//! Callers decide what to do with a stale entry: refresh it, or serve it
//! when the refresh fails.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct FreshnessCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K: Eq + Hash, V: Clone> FreshnessCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        FreshnessCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached value and whether it was refreshed within the TTL.
    pub fn get(&self, key: &K) -> Option<(V, bool)> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .map(|(value, refreshed_at)| (value.clone(), refreshed_at.elapsed() < self.ttl))
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_ttl() {
        let cache = FreshnessCache::new(Duration::from_secs(60));
        assert!(cache.get(&"k").is_none());

        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), Some((1, true)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&"k"), Some((1, false)));

        cache.invalidate();
        assert!(cache.get(&"k").is_none());
    }
}
