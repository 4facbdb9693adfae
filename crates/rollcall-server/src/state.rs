//! Shared application state handed to every handler and middleware.

use std::sync::Arc;
use std::time::Duration;

use rollcall_notifications::{SmsAdapter, create_sms_adapter};
use rollcall_storage::DynDocumentStore;

use crate::cache::{self, DynKvCache, InvalidationCoordinator, ReadThroughCache};
use crate::config::{AppConfig, StorageBackend};
use crate::rate_limit::RateLimiter;
use crate::services::notify::AbsenceNotifier;
use crate::usage::UsageAccountant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: DynDocumentStore,
    pub kv: DynKvCache,
    pub cache: ReadThroughCache,
    pub invalidation: InvalidationCoordinator,
    pub usage: UsageAccountant,
    pub rate_limiter: RateLimiter,
    pub notifier: AbsenceNotifier,
}

impl AppState {
    /// Wires the state from already constructed backends.
    pub fn new(
        config: AppConfig,
        store: DynDocumentStore,
        kv: DynKvCache,
        sms: Arc<dyn SmsAdapter>,
    ) -> Self {
        let cache = ReadThroughCache::new(kv.clone(), Duration::from_secs(config.cache.ttl_secs));
        let invalidation = InvalidationCoordinator::new(kv.clone(), config.cache.scan_batch_size);
        let usage = UsageAccountant::new(
            kv.clone(),
            config.usage.max_recent_requests,
            config.usage.enabled,
        );
        let rate_limiter = RateLimiter::new(kv.clone(), &config.rate_limit);
        let notifier = AbsenceNotifier::new(sms, cache.clone(), store.clone());

        Self {
            config: Arc::new(config),
            store,
            kv,
            cache,
            invalidation,
            usage,
            rate_limiter,
            notifier,
        }
    }

    /// Builds the store, cache and SMS backends described by `config`.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store = create_store(&config).await?;
        let kv = cache::create_kv_cache(&config.redis).await;
        let sms = create_sms_adapter(&config.sms)?;
        tracing::info!(
            store = store.backend_name(),
            cache = kv.backend_name(),
            sms = sms.provider(),
            "Application state initialized"
        );
        Ok(Self::new(config, store, kv, sms))
    }
}

async fn create_store(config: &AppConfig) -> anyhow::Result<DynDocumentStore> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory document store");
            Ok(rollcall_db_memory::create_memory_store())
        }
        StorageBackend::Postgres => {
            let pg_config = rollcall_db_postgres::PostgresConfig::from(&config.storage.postgres);
            tracing::info!(
                url = %rollcall_db_postgres::pool::mask_password(&pg_config.url),
                "Using PostgreSQL document store"
            );
            let store = rollcall_db_postgres::PostgresStore::new(pg_config).await?;
            Ok(Arc::new(store))
        }
    }
}
