pub mod adapters;
pub mod error;
pub mod provider;
pub mod templates;

pub use adapters::{LogSmsAdapter, SendResult, SmsAdapter, TwilioSmsAdapter};
pub use error::NotificationError;
pub use provider::{SmsConfig, SmsProvider, TwilioConfig, create_sms_adapter};
pub use templates::absence_message;
