use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncStd1Executor, AsyncTransport, Message};
use log::*;

use super::{otp_message, NotifyError, OtpSender};
use crate::config::SmtpConfig;

const IMPLICIT_TLS_PORT: u16 = 465;

/**
 * Sends codes over SMTP
 */
pub struct Mailer {
    transport: AsyncSmtpTransport<AsyncStd1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        if config.host.is_empty() {
            return Err(NotifyError::NotConfigured("SMTP_HOST"));
        }
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| NotifyError::Address(config.from.clone()))?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<AsyncStd1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<AsyncStd1Executor>::starttls_relay(&config.host)
        }
        .map_err(|err| NotifyError::Mail(err.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
            .build();

        Ok(Mailer { transport, from })
    }
}

pub fn otp_email(from: Mailbox, to: &str, otp: &str) -> Result<Message, NotifyError> {
    let to: Mailbox = to.parse().map_err(|_| NotifyError::Address(to.to_string()))?;
    Message::builder()
        .from(from)
        .to(to)
        .subject("Your OTP Code")
        .body(otp_message(otp))
        .map_err(|err| NotifyError::Mail(err.to_string()))
}

#[async_trait]
impl OtpSender for Mailer {
    async fn send_otp(&self, to: &str, otp: &str) -> Result<(), NotifyError> {
        let email = otp_email(self.from.clone(), to, otp)?;
        self.transport
            .send(email)
            .await
            .map_err(|err| NotifyError::Mail(err.to_string()))?;
        info!("[EMAIL] sent OTP to {}", to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Mailbox {
        "noreply@example.com".parse().unwrap()
    }

    #[test]
    fn builds_the_message() {
        let message = otp_email(sender(), "voter@example.com", "042424").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Your OTP Code"));
        assert!(raw.contains("To: voter@example.com"));
        assert!(raw.contains("Your OTP is: 042424"));
    }

    #[test]
    fn rejects_bad_recipient() {
        assert!(matches!(
            otp_email(sender(), "not an address", "042424"),
            Err(NotifyError::Address(_))
        ));
    }

    #[test]
    fn requires_a_host() {
        let config = SmtpConfig {
            host: String::new(),
            port: 587,
            user: String::new(),
            pass: String::new(),
            from: "noreply@example.com".to_string(),
        };
        assert!(matches!(Mailer::new(&config), Err(NotifyError::NotConfigured("SMTP_HOST"))));
    }
}
