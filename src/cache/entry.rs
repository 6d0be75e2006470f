//! Cache Entry Module
//!
//! Defines the logical unit stored per key, with its expiration metadata.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A value together with the timestamps the cache needs to expire it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The stored value
    pub value: T,
    /// Insertion timestamp (Unix milliseconds)
    pub inserted_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Optional time to live, measured from now
    pub fn new(value: T, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64));

        Self {
            value,
            inserted_at: now,
            expires_at,
        }
    }

    /// Rebuilds an entry from timestamps that were stored elsewhere.
    pub fn with_timestamps(value: T, inserted_at: u64, expires_at: Option<u64>) -> Self {
        Self {
            value,
            inserted_at,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal
    /// to its expiration time.
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.expires_at, current_timestamp_ms())
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Expiry check against an explicit clock reading.
pub(crate) fn is_expired_at(expires_at: Option<u64>, now_ms: u64) -> bool {
    match expires_at {
        Some(expires) => now_ms >= expires,
        None => false,
    }
}
