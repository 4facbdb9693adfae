//! Fixed-window rate limiting per client.
//!
//! Each client gets a per-minute and a per-hour counter in the key/value
//! cache, keyed by the window bucket (`epoch_secs / window_len`). Counters
//! expire with their window, so a new bucket always starts from zero.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::{CacheError, DynKvCache};
use crate::config::RateLimitConfig;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Minute,
    Hour,
}

impl RateWindow {
    pub fn secs(&self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3600,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
        }
    }

    fn key(&self, client: &str, now_secs: u64) -> String {
        format!(
            "rate_limit:{}:{client}:{}",
            self.label(),
            now_secs / self.secs()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { window: RateWindow, retry_after: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    kv: DynKvCache,
    per_minute: u64,
    per_hour: u64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(kv: DynKvCache, config: &RateLimitConfig) -> Self {
        Self {
            kv,
            per_minute: config.per_minute,
            per_hour: config.per_hour,
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn check(&self, client: &str) -> RateDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.check_at(client, now).await
    }

    /// Counts one request at `now_secs`. Bookkeeping failures admit the
    /// request.
    pub async fn check_at(&self, client: &str, now_secs: u64) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }
        for (window, limit) in [
            (RateWindow::Minute, self.per_minute),
            (RateWindow::Hour, self.per_hour),
        ] {
            match self.hit(window, client, now_secs).await {
                Ok(count) if count > limit as i64 => {
                    tracing::info!(client = %client, window = window.label(), count, "rate limit exceeded");
                    metrics::record_rate_limit_rejection(window.label());
                    return RateDecision::Limited {
                        window,
                        retry_after: window.secs(),
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(client = %client, error = %e, "rate limit bookkeeping failed, admitting request");
                    metrics::record_cache_error("rate_limit");
                    return RateDecision::Allowed;
                }
            }
        }
        RateDecision::Allowed
    }

    async fn hit(&self, window: RateWindow, client: &str, now_secs: u64) -> Result<i64, CacheError> {
        let key = window.key(client, now_secs);
        let count = self.kv.increment(&key, 1).await?;
        // Refreshed on every hit so a lost EXPIRE never leaves the bucket
        // without a TTL.
        if let Err(e) = self
            .kv
            .expire(&key, Duration::from_secs(window.secs()))
            .await
        {
            tracing::warn!(key = %key, error = %e, "failed to set rate limit bucket expiry");
            metrics::record_cache_error("rate_limit_expire");
        }
        Ok(count)
    }
}
