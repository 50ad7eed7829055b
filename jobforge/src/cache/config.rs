//! Cache configuration.

use std::time::Duration;

use super::strategy::EvictionStrategy;

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default memory budget in bytes (64 MB).
pub const DEFAULT_MAX_SIZE_BYTES: usize = 64 * 1024 * 1024;

/// Default interval between expiry-sweep/adaptive maintenance passes.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Hit rate below which the adaptive strategy switches to LFU.
pub const ADAPTIVE_LFU_THRESHOLD: f64 = 0.5;

/// Hit rate above which the adaptive strategy switches to LRU.
pub const ADAPTIVE_LRU_THRESHOLD: f64 = 0.8;

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live entries before eviction.
    pub max_entries: usize,
    /// Memory budget for live entries before eviction.
    pub max_size_bytes: usize,
    /// TTL applied to entries inserted without an explicit TTL.
    pub default_ttl: Option<Duration>,
    /// Configured eviction strategy.
    pub strategy: EvictionStrategy,
    /// Interval between maintenance passes (expiry sweep, adaptive switch).
    pub maintenance_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            default_ttl: None,
            strategy: EvictionStrategy::default(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(config.max_size_bytes, DEFAULT_MAX_SIZE_BYTES);
        assert_eq!(config.strategy, EvictionStrategy::Lru);
        assert!(config.default_ttl.is_none());
    }
}
