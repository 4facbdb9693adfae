use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{SendResult, SmsAdapter};
use crate::error::NotificationError;
use crate::provider::TwilioConfig;

/// Sends SMS through the Twilio Messages API.
pub struct TwilioSmsAdapter {
    http_client: Client,
    config: TwilioConfig,
}

impl TwilioSmsAdapter {
    pub fn new(config: TwilioConfig) -> Result<Self, NotificationError> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            return Err(NotificationError::InvalidConfig(
                "Missing Twilio account_sid or auth_token".into(),
            ));
        }
        if config.from_number.is_empty() {
            return Err(NotificationError::InvalidConfig(
                "Missing Twilio from_number".into(),
            ));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsAdapter for TwilioSmsAdapter {
    async fn send(&self, phone: &str, message: &str) -> Result<SendResult, NotificationError> {
        if phone.trim().is_empty() {
            return Err(NotificationError::InvalidRecipient("empty phone number".into()));
        }

        let form = [
            ("To", phone),
            ("From", self.config.from_number.as_str()),
            ("Body", message),
        ];

        let response = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();

        if status.is_success() {
            let sid = body["sid"].as_str().map(str::to_string);
            Ok(SendResult::delivered(sid))
        } else {
            let error = body["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            Ok(SendResult::rejected(error))
        }
    }

    fn provider(&self) -> &'static str {
        "twilio"
    }
}
