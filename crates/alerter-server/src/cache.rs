//! Bounded, age-limited DashMap caches.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub trait CacheEntry {
    fn recorded_at(&self) -> Instant;
}

/// Drop entries older than `max_age`, then the oldest entries until at most
/// `max_entries` remain. Returns how many entries were removed.
pub fn prune_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration) -> usize
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let now = Instant::now();
    let before = cache.len();
    let mut entries: Vec<(K, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().recorded_at()))
        .collect();

    entries.retain(|(key, recorded_at)| {
        if now.duration_since(*recorded_at) > max_age {
            cache.remove(key);
            false
        } else {
            true
        }
    });

    if cache.len() > max_entries {
        entries.sort_by_key(|(_, recorded_at)| *recorded_at);
        for (key, _) in entries {
            if cache.len() <= max_entries {
                break;
            }
            cache.remove(&key);
        }
    }

    before.saturating_sub(cache.len())
}
