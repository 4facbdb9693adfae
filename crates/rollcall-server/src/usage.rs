//! Per-request usage accounting and the statistics read back from it.
//!
//! Counters live in the key/value cache, bucketed by UTC day:
//!
//! | Key                              | Type       | Content                        |
//! |----------------------------------|------------|--------------------------------|
//! | `usage:total:<day>`              | counter    | requests served                |
//! | `usage:endpoints:<day>`          | hash       | `"<METHOD> <path>"` -> count   |
//! | `usage:status_codes:<day>`       | hash       | status -> count                |
//! | `usage:ips:<day>`                | set        | client addresses               |
//! | `usage:response_times:<day>`     | sorted set | endpoint -> latest latency ms  |
//! | `usage:recent_requests`          | sorted set | event JSON -> epoch ms         |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cache::{CacheError, DynKvCache};
use crate::metrics;

/// Paths that are neither counted nor rate limited.
pub const EXEMPT_PATHS: &[&str] = &[
    "/health",
    "/readiness",
    "/metrics",
    "/docs",
    "/openapi.json",
    "/redoc",
    "/api/docs",
    "/api/redoc",
];

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

const RECENT_REQUESTS_KEY: &str = "usage:recent_requests";

fn total_key(day: &str) -> String {
    format!("usage:total:{day}")
}

fn endpoints_key(day: &str) -> String {
    format!("usage:endpoints:{day}")
}

fn status_codes_key(day: &str) -> String {
    format!("usage:status_codes:{day}")
}

fn ips_key(day: &str) -> String {
    format!("usage:ips:{day}")
}

fn response_times_key(day: &str) -> String {
    format!("usage:response_times:{day}")
}

/// One completed request as stored in the recent-request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub time_ms: f64,
    pub ip: String,
    pub timestamp: String,
    /// Unrounded latency, used for the per-endpoint latency gauge.
    #[serde(skip)]
    elapsed_ms: f64,
}

impl RequestEvent {
    /// Builds an event stamped with the current time.
    pub fn new(method: &str, path: &str, status: u16, time_ms: f64, ip: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            method: method.to_string(),
            path: path.to_string(),
            status,
            time_ms: (time_ms * 100.0).round() / 100.0,
            ip: ip.to_string(),
            timestamp: now.format(&Rfc3339).unwrap_or_default(),
            elapsed_ms: time_ms,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    fn sort_key(&self, score: f64) -> i128 {
        OffsetDateTime::parse(&self.timestamp, &Rfc3339)
            .map(|t| t.unix_timestamp_nanos())
            .unwrap_or((score as i128) * 1_000_000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodaySummary {
    pub date: String,
    pub total_requests: i64,
    pub unique_visitors: u64,
    pub status_codes: BTreeMap<String, i64>,
    pub top_endpoints: Vec<EndpointCount>,
}

/// Latest latency sample for an endpoint. The field name is kept for wire
/// compatibility; the value is not an average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLatency {
    pub endpoint: String,
    pub avg_response_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowestEndpoints {
    pub date: String,
    pub slowest_endpoints: Vec<EndpointLatency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentRequests {
    pub recent_requests: Vec<RequestEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointBreakdown {
    pub date: String,
    pub endpoints: BTreeMap<String, i64>,
    pub status_codes: BTreeMap<String, i64>,
}

#[derive(Clone)]
pub struct UsageAccountant {
    kv: DynKvCache,
    max_recent: usize,
    enabled: bool,
}

impl UsageAccountant {
    pub fn new(kv: DynKvCache, max_recent: usize, enabled: bool) -> Self {
        Self {
            kv,
            max_recent: max_recent.max(1),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records one completed request. Every step is independent and best
    /// effort; a failure is logged and the remaining steps still run.
    pub async fn record(&self, event: &RequestEvent) {
        if !self.enabled {
            return;
        }
        let day = rollcall_core::today();
        let endpoint = event.endpoint();
        let status = event.status.to_string();

        note("incr", self.kv.increment(&total_key(&day), 1).await);
        note(
            "hincrby",
            self.kv.hash_increment(&endpoints_key(&day), &endpoint, 1).await,
        );
        note(
            "zadd",
            self.kv
                .sorted_set_add(&response_times_key(&day), &endpoint, event.elapsed_ms.trunc())
                .await,
        );
        note(
            "hincrby",
            self.kv.hash_increment(&status_codes_key(&day), &status, 1).await,
        );
        note("sadd", self.kv.set_add(&ips_key(&day), &event.ip).await);

        match serde_json::to_string(event) {
            Ok(member) => {
                let score = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
                note(
                    "zadd",
                    self.kv
                        .sorted_set_add(RECENT_REQUESTS_KEY, &member, score as f64)
                        .await,
                );
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize request event"),
        }

        // Keep only the newest `max_recent` entries.
        let stop = -(self.max_recent as isize) - 1;
        note(
            "zremrangebyrank",
            self.kv
                .sorted_set_trim_by_rank(RECENT_REQUESTS_KEY, 0, stop)
                .await,
        );
    }

    pub async fn today_summary(&self) -> Result<TodaySummary, CacheError> {
        let day = rollcall_core::today();
        let total_requests = match self.kv.get(&total_key(&day)).await? {
            Some(raw) => raw.parse().unwrap_or(0),
            None => 0,
        };
        let unique_visitors = self.kv.set_cardinality(&ips_key(&day)).await?;
        let status_codes = self.kv.hash_get_all(&status_codes_key(&day)).await?;
        let endpoints = self.kv.hash_get_all(&endpoints_key(&day)).await?;

        let mut top_endpoints: Vec<EndpointCount> = endpoints
            .into_iter()
            .map(|(endpoint, count)| EndpointCount { endpoint, count })
            .collect();
        top_endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.endpoint.cmp(&b.endpoint)));
        top_endpoints.truncate(10);

        Ok(TodaySummary {
            date: day,
            total_requests,
            unique_visitors,
            status_codes: status_codes.into_iter().collect(),
            top_endpoints,
        })
    }

    pub async fn slowest(&self, limit: usize) -> Result<SlowestEndpoints, CacheError> {
        let day = rollcall_core::today();
        let slowest_endpoints = if limit == 0 {
            Vec::new()
        } else {
            self.kv
                .sorted_set_range(&response_times_key(&day), 0, limit as isize - 1, true)
                .await?
                .into_iter()
                .map(|(endpoint, ms)| EndpointLatency {
                    endpoint,
                    avg_response_time_ms: ms as i64,
                })
                .collect()
        };
        Ok(SlowestEndpoints {
            date: day,
            slowest_endpoints,
        })
    }

    pub async fn recent(&self, limit: usize) -> Result<RecentRequests, CacheError> {
        if limit == 0 {
            return Ok(RecentRequests {
                recent_requests: Vec::new(),
            });
        }
        let entries = self
            .kv
            .sorted_set_range(RECENT_REQUESTS_KEY, -(limit as isize), -1, false)
            .await?;

        let mut events: Vec<(i128, RequestEvent)> = entries
            .into_iter()
            .filter_map(|(raw, score)| match serde_json::from_str::<RequestEvent>(&raw) {
                Ok(event) => Some((event.sort_key(score), event)),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed recent request entry");
                    None
                }
            })
            .collect();
        events.sort_by(|a, b| b.0.cmp(&a.0));
        events.truncate(limit);

        Ok(RecentRequests {
            recent_requests: events.into_iter().map(|(_, e)| e).collect(),
        })
    }

    /// Endpoint and status counts for one day. `day` must already be a
    /// canonical `YYYY-MM-DD`.
    pub async fn breakdown(&self, day: &str) -> Result<EndpointBreakdown, CacheError> {
        let endpoints = self.kv.hash_get_all(&endpoints_key(day)).await?;
        let status_codes = self.kv.hash_get_all(&status_codes_key(day)).await?;
        Ok(EndpointBreakdown {
            date: day.to_string(),
            endpoints: endpoints.into_iter().collect(),
            status_codes: status_codes.into_iter().collect(),
        })
    }
}

fn note<T>(op: &'static str, result: Result<T, CacheError>) {
    if let Err(e) = result {
        tracing::warn!(op, error = %e, "usage accounting step failed");
        metrics::record_cache_error(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKv;
    use std::sync::Arc;

    fn accountant(max_recent: usize) -> UsageAccountant {
        UsageAccountant::new(Arc::new(MemoryKv::new()), max_recent, true)
    }

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt("/health"));
        assert!(is_exempt("/metrics"));
        assert!(!is_exempt("/students"));
        assert!(!is_exempt("/health/extra"));
    }

    #[test]
    fn test_event_rounds_latency() {
        let event = RequestEvent::new("GET", "/students", 200, 12.3456, "10.0.0.1");
        assert_eq!(event.time_ms, 12.35);
        assert_eq!(event.endpoint(), "GET /students");
        assert!(OffsetDateTime::parse(&event.timestamp, &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn test_summary_counts_requests() {
        let usage = accountant(100);
        usage
            .record(&RequestEvent::new("GET", "/students", 200, 5.0, "1.1.1.1"))
            .await;
        usage
            .record(&RequestEvent::new("GET", "/students", 200, 7.0, "1.1.1.1"))
            .await;
        usage
            .record(&RequestEvent::new("POST", "/students", 409, 3.0, "2.2.2.2"))
            .await;

        let summary = usage.today_summary().await.unwrap();
        assert_eq!(summary.date, rollcall_core::today());
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.unique_visitors, 2);
        assert_eq!(summary.status_codes["200"], 2);
        assert_eq!(summary.status_codes["409"], 1);
        assert_eq!(
            summary.top_endpoints[0],
            EndpointCount {
                endpoint: "GET /students".into(),
                count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_slowest_keeps_latest_sample() {
        let usage = accountant(100);
        usage
            .record(&RequestEvent::new("GET", "/students", 200, 90.0, "ip"))
            .await;
        usage
            .record(&RequestEvent::new("GET", "/students", 200, 4.9, "ip"))
            .await;
        usage
            .record(&RequestEvent::new("GET", "/attendance", 200, 20.0, "ip"))
            .await;

        let slowest = usage.slowest(10).await.unwrap();
        assert_eq!(
            slowest.slowest_endpoints,
            vec![
                EndpointLatency {
                    endpoint: "GET /attendance".into(),
                    avg_response_time_ms: 20
                },
                EndpointLatency {
                    endpoint: "GET /students".into(),
                    avg_response_time_ms: 4
                },
            ]
        );
        assert_eq!(usage.slowest(1).await.unwrap().slowest_endpoints.len(), 1);
        assert!(usage.slowest(0).await.unwrap().slowest_endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_slowest_truncates_unrounded_latency() {
        let usage = accountant(100);
        let event = RequestEvent::new("GET", "/students", 200, 4.996, "ip");
        assert_eq!(event.time_ms, 5.0);
        usage.record(&event).await;

        let slowest = usage.slowest(1).await.unwrap();
        assert_eq!(slowest.slowest_endpoints[0].avg_response_time_ms, 4);
    }

    #[tokio::test]
    async fn test_recent_log_is_bounded_and_newest_first() {
        let usage = accountant(5);
        for i in 0..12 {
            usage
                .record(&RequestEvent::new("GET", &format!("/students/S{i}"), 200, 1.0, "ip"))
                .await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let recent = usage.recent(20).await.unwrap().recent_requests;
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].path, "/students/S11");
        assert_eq!(recent[4].path, "/students/S7");

        let two = usage.recent(2).await.unwrap().recent_requests;
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].path, "/students/S11");
    }

    #[tokio::test]
    async fn test_breakdown_for_empty_day() {
        let usage = accountant(10);
        let breakdown = usage.breakdown("2001-01-01").await.unwrap();
        assert_eq!(breakdown.date, "2001-01-01");
        assert!(breakdown.endpoints.is_empty());
        assert!(breakdown.status_codes.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_accountant_records_nothing() {
        let usage = UsageAccountant::new(Arc::new(MemoryKv::new()), 10, false);
        usage
            .record(&RequestEvent::new("GET", "/students", 200, 1.0, "ip"))
            .await;
        assert_eq!(usage.today_summary().await.unwrap().total_requests, 0);
    }
}
