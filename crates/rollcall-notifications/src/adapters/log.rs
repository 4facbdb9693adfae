use async_trait::async_trait;

use super::{SendResult, SmsAdapter};
use crate::error::NotificationError;

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSmsAdapter;

#[async_trait]
impl SmsAdapter for LogSmsAdapter {
    async fn send(&self, phone: &str, message: &str) -> Result<SendResult, NotificationError> {
        tracing::info!(to = %phone, body = %message, "SMS (log provider)");
        Ok(SendResult::delivered(None))
    }

    fn provider(&self) -> &'static str {
        "log"
    }
}
