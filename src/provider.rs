use log::*;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult};
use crate::notify::sms::basic_auth;

/**
 * Form posted to the hosted OTP service to start a verification
 */
#[derive(Debug, Serialize, PartialEq)]
pub struct VerifyForm {
    pub channel: &'static str,
    pub phone_sms: String,
    pub callback_url: String,
    pub success_redirect_url: String,
    pub fail_redirect_url: String,
    pub metadata: String,
}

impl VerifyForm {
    pub fn new(phone: &str, base_url: &str) -> Self {
        VerifyForm {
            channel: "sms",
            phone_sms: phone.to_string(),
            callback_url: format!("{}/auth/callback", base_url),
            success_redirect_url: format!("{}/auth/success", base_url),
            fail_redirect_url: format!("{}/auth/failure", base_url),
            metadata: serde_json::json!({ "phone": phone }).to_string(),
        }
    }
}

/**
 * What the service posts back once the user has (or has not) verified
 */
#[derive(Debug, Deserialize)]
pub struct Callback {
    #[serde(default)]
    pub otp_id: String,
    #[serde(default)]
    pub auth_status: String,
    #[serde(default)]
    pub phone_sms: String,
}

impl Callback {
    pub fn is_verified(&self) -> bool {
        self.auth_status == "verified"
    }
}

/**
 * Client for the hosted OTP verification service
 */
#[derive(Clone, Debug)]
pub struct OtpProvider {
    config: ProviderConfig,
}

impl OtpProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /**
     * Ask the service to text a code to `phone`, handing back its reply untouched
     */
    pub async fn request(&self, phone: &str, base_url: &str) -> AppResult<serde_json::Value> {
        if self.config.api_key.is_empty() || self.config.api_token.is_empty() {
            return Err(AppError::Internal("OTP credentials not set".to_string()));
        }

        let form = VerifyForm::new(phone, base_url);
        let body = surf::Body::from_form(&form)
            .map_err(|err| AppError::Internal(format!("could not encode OTP form: {}", err)))?;

        debug!("Requesting OTP for phone: {}", phone);
        let mut res = surf::post(&self.config.api_url)
            .header(
                "Authorization",
                basic_auth(&self.config.api_key, &self.config.api_token),
            )
            .body(body)
            .await
            .map_err(|err| {
                error!("OTP service unreachable: {}", err);
                AppError::Upstream("Failed to contact OTP service".to_string())
            })?;

        res.body_json::<serde_json::Value>()
            .await
            .map_err(|_| AppError::Upstream("Invalid OTP service response".to_string()))
    }
}
