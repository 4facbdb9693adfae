//! Write-path cache invalidation.
//!
//! Every successful write deletes the keys that could hold data affected by
//! it, then sweeps parameterized keys by pattern. Failures are logged and
//! counted but never returned: TTL expiry bounds any staleness they leave.

use futures_util::stream::{self, Stream, StreamExt};

use super::keys;
use super::kv::{CacheError, DynKvCache};
use crate::metrics;

#[derive(Clone)]
pub struct InvalidationCoordinator {
    kv: DynKvCache,
    scan_batch: usize,
}

impl InvalidationCoordinator {
    pub fn new(kv: DynKvCache, scan_batch: usize) -> Self {
        Self {
            kv,
            scan_batch: scan_batch.max(1),
        }
    }

    /// A student was created or updated.
    pub async fn student_changed(&self, code: &str) {
        self.delete_key(keys::student(code)).await;
        self.delete_key(keys::STUDENTS_LIST.to_string()).await;
    }

    /// A student was deleted. Their per-day attendance entries go too.
    pub async fn student_deleted(&self, code: &str) {
        self.student_changed(code).await;
        self.sweep_delete(&keys::attendance_sweep_pattern(code)).await;
    }

    /// An attendance record was created or replaced.
    pub async fn attendance_marked(&self, code: &str, date: &str) {
        let direct = [
            keys::attendance(code, date),
            keys::ATTENDANCE_LIST_ALL.to_string(),
            keys::attendance_list(Some(date), None),
            keys::attendance_list(None, Some(code)),
            keys::attendance_list(Some(date), Some(code)),
        ];
        for key in direct {
            self.delete_key(key).await;
        }
        self.sweep_delete(&keys::attendance_sweep_pattern(code)).await;
    }

    /// Lazily scans the keys matching `pattern`, one batch per cursor step.
    ///
    /// The stream ends when the scan cursor returns to 0 or on the first
    /// error, which is yielded as the last item.
    pub fn sweep(
        &self,
        pattern: &str,
    ) -> impl Stream<Item = Result<Vec<String>, CacheError>> + Send + 'static {
        let kv = self.kv.clone();
        let pattern = pattern.to_string();
        let batch = self.scan_batch;

        stream::unfold(Some(0u64), move |cursor| {
            let kv = kv.clone();
            let pattern = pattern.clone();
            async move {
                let cursor = cursor?;
                match kv.scan(cursor, &pattern, batch).await {
                    Ok((next, found)) => Some((Ok(found), (next != 0).then_some(next))),
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
    }

    /// Deletes every key matching `pattern`, batch by batch. Returns the
    /// number of keys removed.
    pub async fn sweep_delete(&self, pattern: &str) -> u64 {
        let mut batches = std::pin::pin!(self.sweep(pattern));
        let mut removed = 0;

        while let Some(batch) = batches.next().await {
            match batch {
                Ok(found) if found.is_empty() => {}
                Ok(found) => match self.kv.delete(&found).await {
                    Ok(n) => removed += n,
                    Err(e) => {
                        tracing::warn!(pattern = %pattern, error = %e, "cache sweep delete failed");
                        metrics::record_cache_error("delete");
                        break;
                    }
                },
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "cache sweep scan failed");
                    metrics::record_cache_error("scan");
                    break;
                }
            }
        }

        tracing::debug!(pattern = %pattern, removed, "cache sweep finished");
        removed
    }

    async fn delete_key(&self, key: String) {
        match self.kv.delete(std::slice::from_ref(&key)).await {
            Ok(_) => tracing::debug!(key = %key, "cache invalidated"),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache invalidation failed");
                metrics::record_cache_error("delete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kv::KvCache;
    use crate::cache::memory::MemoryKv;
    use std::sync::Arc;
    use std::time::Duration;

    async fn seed(kv: &MemoryKv, keys: &[&str]) {
        for key in keys {
            kv.set_with_ttl(key, "[]", Duration::from_secs(60))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_student_changed_drops_entity_and_list() {
        let kv = Arc::new(MemoryKv::new());
        seed(&kv, &["student:S1", "students:list", "student:S2"]).await;

        InvalidationCoordinator::new(kv.clone(), 10)
            .student_changed("S1")
            .await;

        assert!(kv.get("student:S1").await.unwrap().is_none());
        assert!(kv.get("students:list").await.unwrap().is_none());
        assert!(kv.get("student:S2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_attendance_marked_drops_every_affected_list() {
        let kv = Arc::new(MemoryKv::new());
        seed(
            &kv,
            &[
                "attendance:S1:2024-01-01",
                "attendance:S1:2023-12-31",
                "attendance:list:all",
                "attendance:list:2024-01-01",
                "attendance:list:student:S1",
                "attendance:list:2024-01-01:S1",
                "attendance:S2:2024-01-01",
                "attendance:list:2024-01-02",
            ],
        )
        .await;

        InvalidationCoordinator::new(kv.clone(), 2)
            .attendance_marked("S1", "2024-01-01")
            .await;

        let mut left: Vec<String> = Vec::new();
        let (_, found) = kv.scan(0, "*", 100).await.unwrap();
        left.extend(found);
        left.sort();
        assert_eq!(
            left,
            vec![
                "attendance:S2:2024-01-01".to_string(),
                "attendance:list:2024-01-02".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_student_deleted_sweeps_attendance() {
        let kv = Arc::new(MemoryKv::new());
        let many: Vec<String> = (1..=30).map(|d| format!("attendance:S9:2024-03-{d:02}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        seed(&kv, &refs).await;
        seed(&kv, &["student:S9"]).await;

        let coordinator = InvalidationCoordinator::new(kv.clone(), 4);
        coordinator.student_deleted("S9").await;

        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_stream_is_finite_and_restartable() {
        let kv = Arc::new(MemoryKv::new());
        seed(&kv, &["attendance:S1:a", "attendance:S1:b", "attendance:S1:c"]).await;
        let coordinator = InvalidationCoordinator::new(kv.clone(), 1);

        for _ in 0..2 {
            let batches: Vec<_> = coordinator.sweep("attendance:S1:*").collect().await;
            let total: usize = batches.into_iter().map(|b| b.unwrap().len()).sum();
            assert_eq!(total, 3);
        }
        assert_eq!(coordinator.sweep_delete("attendance:S1:*").await, 3);
        assert_eq!(coordinator.sweep_delete("attendance:S1:*").await, 0);
    }
}
