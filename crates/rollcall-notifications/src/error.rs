use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}
