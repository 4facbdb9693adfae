//! Background absence notifications.

use std::sync::Arc;

use rollcall_notifications::{SendResult, SmsAdapter, absence_message};
use rollcall_storage::DynDocumentStore;
use tokio::task::JoinHandle;

use crate::cache::ReadThroughCache;
use crate::metrics;
use crate::services::students;

#[derive(Clone)]
pub struct AbsenceNotifier {
    sms: Arc<dyn SmsAdapter>,
    cache: ReadThroughCache,
    store: DynDocumentStore,
}

impl AbsenceNotifier {
    pub fn new(sms: Arc<dyn SmsAdapter>, cache: ReadThroughCache, store: DynDocumentStore) -> Self {
        Self { sms, cache, store }
    }

    /// Schedules the notification without waiting for it.
    pub fn notify_absence(&self, code: String, date: String) -> JoinHandle<Option<SendResult>> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.send_absence(&code, &date).await })
    }

    /// Looks the student up and texts the phone on file, if any. Returns
    /// `None` when nothing was sent.
    pub async fn send_absence(&self, code: &str, date: &str) -> Option<SendResult> {
        let student = match students::find_cached(&self.cache, &self.store, code).await {
            Ok(student) => student,
            Err(e) => {
                tracing::debug!(student_code = %code, error = %e, "no student for absence notification");
                return None;
            }
        };
        let phone = student.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())?;

        let provider = self.sms.provider();
        let message = absence_message(&student.first_name, &student.last_name, date);
        match self.sms.send(phone, &message).await {
            Ok(result) if result.success => {
                tracing::info!(student_code = %code, provider, "absence SMS sent");
                metrics::record_sms(provider, "sent");
                Some(result)
            }
            Ok(result) => {
                tracing::warn!(
                    student_code = %code,
                    provider,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "absence SMS rejected"
                );
                metrics::record_sms(provider, "rejected");
                Some(result)
            }
            Err(e) => {
                tracing::warn!(student_code = %code, provider, error = %e, "absence SMS failed");
                metrics::record_sms(provider, "failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKv;
    use async_trait::async_trait;
    use rollcall_notifications::NotificationError;
    use rollcall_storage::{Collection, to_document};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsAdapter for Recorder {
        async fn send(&self, phone: &str, message: &str) -> Result<SendResult, NotificationError> {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), message.to_string()));
            Ok(SendResult::delivered(Some("SM1".into())))
        }

        fn provider(&self) -> &'static str {
            "recorder"
        }
    }

    async fn notifier_with(phone: Option<&str>) -> (Arc<Recorder>, AbsenceNotifier) {
        let store = rollcall_db_memory::create_memory_store();
        let student = rollcall_core::Student {
            id: "S1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            student_code: "S1".into(),
            grade_level: None,
            phone: phone.map(String::from),
            email: None,
            class_name: None,
        };
        store
            .insert(Collection::Students, to_document(&student).unwrap())
            .await
            .unwrap();
        let cache = ReadThroughCache::new(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        let recorder = Arc::new(Recorder::default());
        let notifier = AbsenceNotifier::new(recorder.clone(), cache, store);
        (recorder, notifier)
    }

    #[tokio::test]
    async fn test_sends_to_phone_on_file() {
        let (recorder, notifier) = notifier_with(Some("+15550001")).await;
        let result = notifier
            .notify_absence("S1".into(), "2024-01-01".into())
            .await
            .unwrap();
        assert!(result.unwrap().success);
        let sent = recorder.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![(
                "+15550001".to_string(),
                "Student Ada Lovelace was absent on 2024-01-01.".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_skips_without_phone_or_student() {
        let (recorder, notifier) = notifier_with(None).await;
        assert!(notifier.send_absence("S1", "2024-01-01").await.is_none());
        assert!(notifier.send_absence("NOPE", "2024-01-01").await.is_none());
        assert!(recorder.sent.lock().unwrap().is_empty());
    }
}
