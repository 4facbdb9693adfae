//! Connection pool management for the PostgreSQL storage backend.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

/// Type alias for PostgreSQL pool options.
pub type PgPoolOptions = PoolOptions<Postgres>;

/// Creates a new PostgreSQL connection pool from the given configuration.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    info!(
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections((config.pool_size / 4).max(1))
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(Duration::from_secs(1800));

    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;

    debug!("PostgreSQL connection pool created successfully");

    Ok(pool)
}

/// Masks the password in a database URL for logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
