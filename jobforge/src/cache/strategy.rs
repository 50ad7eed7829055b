//! Eviction strategies and victim selection.

use std::collections::HashMap;

use super::entry::CacheEntry;

/// Policy used to choose which entry to remove when capacity is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionStrategy {
    /// Evict the least-recently-touched entry.
    #[default]
    Lru,
    /// Evict the entry with the lowest access count.
    Lfu,
    /// Evict the oldest-inserted entry.
    Fifo,
    /// Evict the entry with the nearest expiry; falls back to LRU when no
    /// entry carries a TTL.
    Ttl,
    /// Periodically switch between LFU and LRU based on the observed hit
    /// rate (handled by the maintenance loop).
    Adaptive,
}

impl EvictionStrategy {
    /// Returns the strategy name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Fifo => "fifo",
            EvictionStrategy::Ttl => "ttl",
            EvictionStrategy::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Picks the eviction victim among `entries` under the given strategy.
///
/// `Adaptive` selects like LRU here; the adaptive behavior is the periodic
/// policy switch performed by the maintenance loop, not a distinct victim
/// rule. Returns `None` only for an empty map.
pub fn select_victim<'a>(
    strategy: EvictionStrategy,
    entries: &'a HashMap<String, CacheEntry>,
) -> Option<&'a str> {
    if entries.is_empty() {
        return None;
    }

    let key = match strategy {
        EvictionStrategy::Lru | EvictionStrategy::Adaptive => entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k),
        EvictionStrategy::Lfu => entries
            .iter()
            .min_by_key(|(_, e)| e.access_count)
            .map(|(k, _)| k),
        EvictionStrategy::Fifo => entries
            .iter()
            .min_by_key(|(_, e)| e.inserted_seq)
            .map(|(k, _)| k),
        EvictionStrategy::Ttl => {
            let soonest = entries
                .iter()
                .filter_map(|(k, e)| e.expires_at.map(|deadline| (k, deadline)))
                .min_by_key(|(_, deadline)| *deadline)
                .map(|(k, _)| k);
            match soonest {
                Some(k) => Some(k),
                // No entry carries a TTL: fall through to LRU.
                None => entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_accessed)
                    .map(|(k, _)| k),
            }
        }
    };

    key.map(String::as_str)
}
