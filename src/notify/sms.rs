use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::*;
use serde::Serialize;

use super::{otp_message, NotifyError, OtpSender};
use crate::config::TwilioConfig;

#[derive(Debug, Serialize)]
struct MessageForm<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "Body")]
    body: String,
}

pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

/**
 * Sends codes as text messages through Twilio's REST API
 */
pub struct SmsSender {
    config: TwilioConfig,
}

impl SmsSender {
    pub fn new(config: &TwilioConfig) -> Result<Self, NotifyError> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            return Err(NotifyError::NotConfigured("TWILIO_ACCOUNT_SID/TWILIO_AUTH_TOKEN"));
        }
        if config.phone_number.is_empty() {
            return Err(NotifyError::NotConfigured("TWILIO_PHONE_NUMBER"));
        }
        Ok(SmsSender {
            config: config.clone(),
        })
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_url, self.config.account_sid
        )
    }
}

#[async_trait]
impl OtpSender for SmsSender {
    async fn send_otp(&self, to: &str, otp: &str) -> Result<(), NotifyError> {
        let form = MessageForm {
            to,
            from: &self.config.phone_number,
            body: otp_message(otp),
        };
        let body = surf::Body::from_form(&form).map_err(|err| NotifyError::Sms(err.to_string()))?;

        let mut res = surf::post(self.messages_url())
            .header(
                "Authorization",
                basic_auth(&self.config.account_sid, &self.config.auth_token),
            )
            .body(body)
            .await
            .map_err(|err| NotifyError::Sms(err.to_string()))?;

        if !res.status().is_success() {
            let detail = res.body_string().await.unwrap_or_default();
            return Err(NotifyError::Sms(format!("twilio replied {}: {}", res.status(), detail)));
        }
        info!("[SMS] sent OTP to {}", to);
        Ok(())
    }
}
