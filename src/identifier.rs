use std::fmt;

use crate::error::{AppError, AppResult};

/**
 * Where a one-time password gets delivered
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

/**
 * A validated email address or phone number
 *
 * Phone numbers are normalised by dropping spaces and dashes so `+1 555-0100` and `+15550100`
 * land on the same user. Emails are lower-cased for the same reason.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identifier {
    value: String,
    channel: Channel,
}

impl Identifier {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::BadRequest("identifier is required".to_string()));
        }

        if raw.contains('@') {
            let mut parts = raw.splitn(2, '@');
            let local = parts.next().unwrap_or_default();
            let domain = parts.next().unwrap_or_default();
            if local.is_empty()
                || domain.is_empty()
                || domain.contains('@')
                || raw.chars().any(char::is_whitespace)
            {
                return Err(AppError::BadRequest("invalid email address".to_string()));
            }
            return Ok(Identifier {
                value: raw.to_lowercase(),
                channel: Channel::Email,
            });
        }

        let phone: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
        let digits = phone.strip_prefix('+').unwrap_or(&phone);
        if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::BadRequest("invalid phone number".to_string()));
        }
        Ok(Identifier {
            value: phone,
            channel: Channel::Sms,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
