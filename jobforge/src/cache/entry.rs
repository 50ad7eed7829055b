//! Cache entry model.

use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Fixed bookkeeping overhead charged per entry on top of key and value
/// bytes when estimating memory usage.
pub const ENTRY_OVERHEAD_BYTES: usize = 64;

/// One stored cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached value.
    pub value: Vec<u8>,
    /// When the entry was inserted.
    pub created_at: Instant,
    /// Absolute expiry deadline, if the entry carries a TTL.
    pub expires_at: Option<Instant>,
    /// Last access time, updated on every hit.
    pub last_accessed: Instant,
    /// Number of hits since insertion.
    pub access_count: u64,
    /// Insertion sequence number, used for FIFO eviction.
    pub inserted_seq: u64,
    /// Estimated size including key and bookkeeping overhead.
    pub size_bytes: usize,
    /// Tags for bulk invalidation.
    pub tags: HashSet<String>,
}

impl CacheEntry {
    /// Creates a new entry, estimating its size from key and value lengths.
    pub fn new(
        key_len: usize,
        value: Vec<u8>,
        ttl: Option<Duration>,
        tags: HashSet<String>,
        inserted_seq: u64,
    ) -> Self {
        let now = Instant::now();
        let size_bytes = key_len + value.len() + ENTRY_OVERHEAD_BYTES;
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|t| now + t),
            last_accessed: now,
            access_count: 0,
            inserted_seq,
            size_bytes,
            tags,
        }
    }

    /// Updates access time and increments the access count.
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }

    /// True if the entry's TTL has elapsed at `now`.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}
