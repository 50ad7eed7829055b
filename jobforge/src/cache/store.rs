//! In-memory cache with pluggable eviction, TTL, and tag invalidation.
//!
//! All state lives behind a single mutex: individual operations are atomic,
//! but a `get` followed by a `set` is not, unless offered as a combined
//! operation. Expired entries are treated as misses and removed lazily on
//! access; a background maintenance loop sweeps the rest.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use super::config::{CacheConfig, ADAPTIVE_LFU_THRESHOLD, ADAPTIVE_LRU_THRESHOLD};
use super::entry::CacheEntry;
use super::preload::Preloader;
use super::stats::{CacheStats, MemoryUsage};
use super::strategy::{select_victim, EvictionStrategy};

/// Errors returned by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A single value exceeds the byte budget even with the cache empty.
    #[error("value of {value_bytes} bytes exceeds cache budget of {budget_bytes} bytes")]
    CapacityExceeded {
        /// Size of the rejected value (including overhead).
        value_bytes: usize,
        /// Configured byte budget.
        budget_bytes: usize,
    },

    /// A capacity parameter was zero.
    #[error("invalid cache capacity: {0}")]
    InvalidCapacity(&'static str),
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
    /// Strategy currently used for victim selection. Differs from the
    /// configured strategy only under `Adaptive`.
    active_strategy: EvictionStrategy,
    max_entries: usize,
    max_size_bytes: usize,
    size_bytes: usize,
    next_seq: u64,
}

impl CacheInner {
    fn sync_stats(&mut self) {
        let (size, count) = (self.size_bytes, self.entries.len());
        self.stats.update_size(size, count);
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = &removed {
            self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        }
        removed
    }
}

/// Key/value store with eviction, TTL, tags, and statistics.
pub struct Cache {
    inner: Mutex<CacheInner>,
    preloaders: Mutex<Vec<Preloader>>,
    default_ttl: Option<Duration>,
    configured_strategy: EvictionStrategy,
    maintenance_interval: Duration,
}

impl Cache {
    /// Creates a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                stats: CacheStats::new(),
                active_strategy: match config.strategy {
                    // Adaptive starts from LRU and lets the maintenance
                    // pass switch policies.
                    EvictionStrategy::Adaptive => EvictionStrategy::Lru,
                    other => other,
                },
                max_entries: config.max_entries.max(1),
                max_size_bytes: config.max_size_bytes.max(1),
                size_bytes: 0,
                next_seq: 0,
            }),
            preloaders: Mutex::new(Vec::new()),
            default_ttl: config.default_ttl,
            configured_strategy: config.strategy,
            maintenance_interval: config.maintenance_interval,
        }
    }

    /// Looks up a key. Expired entries count as misses and are removed.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch();
                let value = entry.value.clone();
                inner.stats.record_hit();
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.remove_entry(key);
            inner.stats.record_expirations(1);
        }
        inner.stats.record_miss();
        if expired {
            inner.sync_stats();
        }
        None
    }

    /// Looks up a key, returning `default` on a miss.
    pub fn get_or(&self, key: &str, default: Vec<u8>) -> Vec<u8> {
        self.get(key).unwrap_or(default)
    }

    /// Inserts a value, evicting first when capacity would be exceeded.
    ///
    /// `ttl` falls back to the configured default TTL when `None`.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: Vec<u8>,
        ttl: Option<Duration>,
        tags: Option<HashSet<String>>,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let mut inner = self.lock();

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = CacheEntry::new(
            key.len(),
            value,
            ttl.or(self.default_ttl),
            tags.unwrap_or_default(),
            seq,
        );

        if entry.size_bytes > inner.max_size_bytes {
            return Err(CacheError::CapacityExceeded {
                value_bytes: entry.size_bytes,
                budget_bytes: inner.max_size_bytes,
            });
        }

        // Overwrites release the old entry's size before budget checks.
        if inner.entries.contains_key(&key) {
            inner.remove_entry(&key);
        }

        let mut evicted = 0u64;
        while inner.entries.len() + 1 > inner.max_entries
            || inner.size_bytes + entry.size_bytes > inner.max_size_bytes
        {
            let strategy = inner.active_strategy;
            let Some(victim) = select_victim(strategy, &inner.entries).map(str::to_string) else {
                break;
            };
            inner.remove_entry(&victim);
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, key = %key, "Evicted entries to make room");
            inner.stats.record_evictions(evicted);
        }

        inner.size_bytes += entry.size_bytes;
        inner.entries.insert(key, entry);
        inner.stats.record_set();
        inner.sync_stats();
        Ok(())
    }

    /// Removes a key. Returns whether a live entry was removed; deleting a
    /// missing key is not an error.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.remove_entry(key).is_some();
        if removed {
            inner.stats.record_delete();
            inner.sync_stats();
        }
        removed
    }

    /// True if a non-expired entry exists for the key. Does not touch the
    /// entry or affect hit/miss counters.
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.size_bytes = 0;
        inner.sync_stats();
    }

    /// Returns all non-expired entries carrying at least one of the tags.
    pub fn get_by_tags(&self, tags: &[String]) -> HashMap<String, Vec<u8>> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .filter(|(_, e)| tags.iter().any(|t| e.tags.contains(t)))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Removes all non-expired entries carrying at least one of the tags.
    /// Returns the number removed.
    pub fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let victims: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .filter(|(_, e)| tags.iter().any(|t| e.tags.contains(t)))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &victims {
            inner.remove_entry(key);
        }
        if !victims.is_empty() {
            inner.stats.deletes += victims.len() as u64;
            inner.sync_stats();
            debug!(count = victims.len(), "Invalidated entries by tag");
        }
        victims.len()
    }

    /// Returns a snapshot of cumulative statistics.
    pub fn stats(&self) -> CacheStats {
        let mut inner = self.lock();
        inner.sync_stats();
        inner.stats.clone()
    }

    /// Returns the current memory usage summary.
    pub fn memory_usage(&self) -> MemoryUsage {
        let inner = self.lock();
        let count = inner.entries.len();
        MemoryUsage {
            bytes: inner.size_bytes,
            entry_count: count,
            avg_entry_size: if count == 0 {
                0
            } else {
                inner.size_bytes / count
            },
        }
    }

    /// Resizes the capacity budgets, evicting immediately if the cache is
    /// now over budget.
    pub fn set_capacity(
        &self,
        max_entries: usize,
        max_size_bytes: usize,
    ) -> Result<(), CacheError> {
        if max_entries == 0 {
            return Err(CacheError::InvalidCapacity("max_entries must be > 0"));
        }
        if max_size_bytes == 0 {
            return Err(CacheError::InvalidCapacity("max_size_bytes must be > 0"));
        }

        let mut inner = self.lock();
        inner.max_entries = max_entries;
        inner.max_size_bytes = max_size_bytes;

        let mut evicted = 0u64;
        while inner.entries.len() > inner.max_entries || inner.size_bytes > inner.max_size_bytes {
            let strategy = inner.active_strategy;
            let Some(victim) = select_victim(strategy, &inner.entries).map(str::to_string) else {
                break;
            };
            inner.remove_entry(&victim);
            evicted += 1;
        }
        if evicted > 0 {
            inner.stats.record_evictions(evicted);
        }
        inner.sync_stats();
        info!(max_entries, max_size_bytes, evicted, "Resized cache");
        Ok(())
    }

    /// Switches the active eviction strategy.
    pub fn set_strategy(&self, strategy: EvictionStrategy) {
        let mut inner = self.lock();
        let effective = match strategy {
            EvictionStrategy::Adaptive => EvictionStrategy::Lru,
            other => other,
        };
        if inner.active_strategy != effective {
            info!(from = %inner.active_strategy, to = %effective, "Switched eviction strategy");
        }
        inner.active_strategy = effective;
    }

    /// Returns the strategy currently used for victim selection.
    pub fn active_strategy(&self) -> EvictionStrategy {
        self.lock().active_strategy
    }

    /// Returns the strategy the cache was configured with.
    pub fn configured_strategy(&self) -> EvictionStrategy {
        self.configured_strategy
    }

    /// Interval the maintenance loop should run at.
    pub fn maintenance_interval(&self) -> Duration {
        self.maintenance_interval
    }

    /// Removes every expired entry. Returns the number removed.
    ///
    /// Called by the maintenance loop; safe to call at any time.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let victims: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &victims {
            inner.remove_entry(key);
        }
        if !victims.is_empty() {
            inner.stats.record_expirations(victims.len() as u64);
            inner.sync_stats();
            debug!(count = victims.len(), "Swept expired entries");
        }
        victims.len()
    }

    /// One adaptive pass: under the `Adaptive` configuration, switch the
    /// active policy to LFU when the hit rate is poor and back to LRU when
    /// it is strong. No-op for any other configured strategy.
    pub fn adaptive_pass(&self) {
        if self.configured_strategy != EvictionStrategy::Adaptive {
            return;
        }
        let mut inner = self.lock();
        let hit_rate = inner.stats.hit_rate();
        let total_lookups = inner.stats.hits + inner.stats.misses;
        if total_lookups == 0 {
            return;
        }

        let target = if hit_rate < ADAPTIVE_LFU_THRESHOLD {
            Some(EvictionStrategy::Lfu)
        } else if hit_rate > ADAPTIVE_LRU_THRESHOLD {
            Some(EvictionStrategy::Lru)
        } else {
            None
        };

        if let Some(target) = target {
            if inner.active_strategy != target {
                info!(hit_rate, to = %target, "Adaptive pass switched eviction strategy");
                inner.active_strategy = target;
            }
        }
    }

    /// Registers a named preload function run periodically by the preload
    /// loop to warm specific keys.
    pub fn register_preload(
        &self,
        name: impl Into<String>,
        interval: Duration,
        f: super::preload::PreloadFn,
    ) {
        let mut preloaders = self.preloaders.lock().unwrap_or_else(|e| e.into_inner());
        preloaders.push(Preloader::new(name.into(), interval, f));
    }

    /// Runs every preloader whose interval has elapsed, inserting whatever
    /// entries it produces. Failures are logged, never propagated.
    pub fn run_due_preloads(&self) {
        let mut due = Vec::new();
        {
            let mut preloaders = self.preloaders.lock().unwrap_or_else(|e| e.into_inner());
            for preloader in preloaders.iter_mut() {
                if preloader.is_due() {
                    preloader.mark_ran();
                    due.push((preloader.name.clone(), preloader.f.clone()));
                }
            }
        }

        for (name, f) in due {
            match f() {
                Ok(entries) => {
                    let count = entries.len();
                    for item in entries {
                        if let Err(e) = self.set(item.key, item.value, item.ttl, item.tags) {
                            tracing::warn!(preloader = %name, error = %e, "Preload insert failed");
                        }
                    }
                    debug!(preloader = %name, count, "Preload pass completed");
                }
                Err(e) => {
                    tracing::warn!(preloader = %name, error = %e, "Preload function failed");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
