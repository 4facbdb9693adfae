//! Caching for Rollcall.
//!
//! ## Architecture
//!
//! - **KvCache**: backend-neutral key/value operations (Redis or in-process)
//! - **ReadThroughCache**: cache-aside reads for students and list queries
//! - **InvalidationCoordinator**: deletes affected keys after every write
//!
//! ## Graceful Degradation
//!
//! If Redis is disabled or unreachable at startup the server falls back to
//! the in-process [`MemoryKv`]. Once running, a failing cache only degrades
//! reads to the store; it never fails a request.

pub mod invalidation;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod read_through;
pub mod redis_kv;

use std::sync::Arc;
use std::time::Duration;

pub use invalidation::InvalidationCoordinator;
pub use kv::{CacheError, DynKvCache, KvCache};
pub use memory::MemoryKv;
pub use read_through::ReadThroughCache;
pub use redis_kv::RedisKv;

use crate::config::RedisConfig;

/// Creates the cache backend from configuration.
///
/// Falls back to the in-process cache when Redis is disabled, the pool
/// cannot be built, or the server does not answer a `PING`.
pub async fn create_kv_cache(config: &RedisConfig) -> DynKvCache {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return Arc::new(MemoryKv::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return Arc::new(MemoryKv::new());
        }
    };

    let redis = RedisKv::new(pool, timeout);
    match redis.ping().await {
        Ok(()) => {
            tracing::info!("Connected to Redis");
            Arc::new(redis)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Redis is not reachable. Falling back to local cache."
            );
            Arc::new(MemoryKv::new())
        }
    }
}
