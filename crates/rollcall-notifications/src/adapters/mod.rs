pub mod log;
pub mod twilio;

use async_trait::async_trait;

use crate::error::NotificationError;

/// Result of sending a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// Adapter for sending SMS messages
#[async_trait]
pub trait SmsAdapter: Send + Sync {
    /// Send `message` to `phone`
    async fn send(&self, phone: &str, message: &str) -> Result<SendResult, NotificationError>;

    /// Provider name used in logs and metrics
    fn provider(&self) -> &'static str;
}

pub use log::LogSmsAdapter;
pub use twilio::TwilioSmsAdapter;
