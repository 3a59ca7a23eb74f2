use async_trait::async_trait;

pub mod mail;
pub mod sms;

pub use mail::Mailer;
pub use sms::SmsSender;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("invalid address: {0}")]
    Address(String),
    #[error("mail transport: {0}")]
    Mail(String),
    #[error("sms transport: {0}")]
    Sms(String),
}

/**
 * Delivers a one-time password to its owner
 */
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send_otp(&self, to: &str, otp: &str) -> Result<(), NotifyError>;
}

pub fn otp_message(otp: &str) -> String {
    format!("Your OTP is: {}", otp)
}
