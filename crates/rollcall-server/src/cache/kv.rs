//! Key/value cache abstraction shared by the read-through cache, the usage
//! accountant and the rate limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Errors returned by a [`KvCache`].
///
/// Callers decide whether a failure degrades (read-through, invalidation,
/// accounting) or surfaces (usage statistics).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("cache command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

/// Generic async key/value operations over string keys.
///
/// Only single-key atomicity is assumed. Sorted-set ranges use Redis rank
/// semantics: `start`/`stop` are inclusive and negative values count from
/// the end.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Deletes the given keys and returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// One step of a cursor scan. A returned cursor of 0 ends the scan.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError>;

    /// Increments an integer counter, creating it at 0 first.
    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    /// Sets a key's expiry. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError>;

    /// All fields of a counter hash.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError>;

    /// Adds or re-scores a member.
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError>;

    /// Members with scores in rank order, highest first when `descending`.
    async fn sorted_set_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        descending: bool,
    ) -> Result<Vec<(String, f64)>, CacheError>;

    /// Removes members by ascending rank and returns how many were removed.
    async fn sorted_set_trim_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<u64, CacheError>;

    /// Returns `true` if the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn set_cardinality(&self, key: &str) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    fn backend_name(&self) -> &'static str;
}

pub type DynKvCache = Arc<dyn KvCache>;

/// Resolves Redis-style inclusive rank bounds against a collection of
/// `len` items. Returns `None` when the range is empty.
pub(crate) fn rank_bounds(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
