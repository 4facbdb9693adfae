pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod server;
pub mod services;
pub mod state;
pub mod usage;

pub use admin::admin_routes;
pub use cache::{CacheError, DynKvCache, KvCache, MemoryKv, RedisKv, create_kv_cache};
pub use config::{
    AdminConfig, AppConfig, CacheConfig, PostgresStorageConfig, RateLimitConfig, RedisConfig,
    ServerConfig, StorageBackend, UsageConfig,
};
pub use error::ApiError;
pub use observability::init_tracing;
pub use rate_limit::{RateDecision, RateLimiter, RateWindow};
pub use server::{RollcallServer, ServerBuilder, build_app, serve_with_shutdown};
pub use state::AppState;
pub use usage::{RequestEvent, UsageAccountant};
