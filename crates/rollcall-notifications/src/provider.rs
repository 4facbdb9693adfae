use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::{LogSmsAdapter, SmsAdapter, TwilioSmsAdapter};
use crate::error::NotificationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsProvider {
    #[default]
    Log,
    Twilio,
}

/// SMS delivery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub provider: SmsProvider,

    #[serde(default)]
    pub twilio: TwilioConfig,
}

/// Twilio credentials and endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    #[serde(default)]
    pub from_number: String,

    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,

    #[serde(default = "default_twilio_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_twilio_timeout_ms() -> u64 {
    10_000
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            base_url: default_twilio_base_url(),
            timeout_ms: default_twilio_timeout_ms(),
        }
    }
}

/// Builds the adapter for the configured provider
pub fn create_sms_adapter(config: &SmsConfig) -> Result<Arc<dyn SmsAdapter>, NotificationError> {
    match config.provider {
        SmsProvider::Log => Ok(Arc::new(LogSmsAdapter)),
        SmsProvider::Twilio => Ok(Arc::new(TwilioSmsAdapter::new(config.twilio.clone())?)),
    }
}
