//! Read-through caching for entities and list queries.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::kv::DynKvCache;
use crate::metrics;

/// Check the cache, else load from the store and populate the cache.
///
/// A cache failure never fails a read: it degrades to a miss and the
/// write-back is best effort.
#[derive(Clone)]
pub struct ReadThroughCache {
    kv: DynKvCache,
    ttl: Duration,
}

impl ReadThroughCache {
    pub fn new(kv: DynKvCache, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// TTL for single entities.
    pub fn entity_ttl(&self) -> Duration {
        self.ttl
    }

    /// TTL for list queries (twice the entity TTL).
    pub fn list_ttl(&self) -> Duration {
        self.ttl * 2
    }

    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.kv.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %key, "cache hit");
                    metrics::record_cache_hit();
                    return Ok(value);
                }
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, loading from store");
                metrics::record_cache_error("get");
            }
        }

        tracing::debug!(key = %key, "cache miss");
        metrics::record_cache_miss();
        let value = loader().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.kv.set_with_ttl(key, &raw, ttl).await {
                    tracing::warn!(key = %key, error = %e, "cache write failed");
                    metrics::record_cache_error("set");
                }
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to serialize cache entry"),
        }

        Ok(value)
    }
}
