use log::*;
use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;

use crate::cache::SharedConnection;
use crate::error::AppResult;

pub const OTP_LENGTH: usize = 6;

/**
 * Compare-and-consume in one round trip
 *
 * KEYS[1] holds the code, KEYS[2] the wrong-guess counter.
 * ARGV[1] is the guess, ARGV[2] the attempt limit, ARGV[3] the counter ttl in seconds.
 * Returns 1 on a match, 0 on a miss and -1 when no code is outstanding.
 */
const VERIFY_SCRIPT: &str = r#"
local stored = redis.call('GET', KEYS[1])
if not stored then
    return -1
end
if stored == ARGV[1] then
    redis.call('DEL', KEYS[1], KEYS[2])
    return 1
end
local attempts = redis.call('INCR', KEYS[2])
if attempts == 1 then
    redis.call('EXPIRE', KEYS[2], ARGV[3])
end
if attempts >= tonumber(ARGV[2]) then
    redis.call('DEL', KEYS[1], KEYS[2])
end
return 0
"#;

/**
 * Outcome of checking a submitted code
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpCheck {
    Verified,
    Mismatch,
    Missing,
}

impl From<i64> for OtpCheck {
    fn from(code: i64) -> Self {
        match code {
            1 => OtpCheck::Verified,
            0 => OtpCheck::Mismatch,
            _ => OtpCheck::Missing,
        }
    }
}

/**
 * Six decimal digits from the operating system's random source
 */
pub fn generate() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

pub fn code_key(identifier: &str) -> String {
    format!("otp:{}", identifier)
}

pub fn attempts_key(identifier: &str) -> String {
    format!("otp:attempts:{}", identifier)
}

pub fn verified_key(identifier: &str) -> String {
    format!("otp:verified:{}", identifier)
}

/**
 * TTL-bound, single-use storage for one-time passwords
 */
#[derive(Clone)]
pub struct OtpStore {
    redis: SharedConnection,
    ttl: Duration,
    max_attempts: u32,
    verified_ttl: Duration,
}

impl OtpStore {
    pub fn new(redis: SharedConnection, ttl: Duration, max_attempts: u32, verified_ttl: Duration) -> Self {
        Self {
            redis,
            ttl,
            max_attempts,
            verified_ttl,
        }
    }

    /**
     * Generate a fresh code for `identifier`, replacing any outstanding one
     */
    pub async fn issue(&self, identifier: &str) -> AppResult<String> {
        let code = generate();
        let (otp_key, counter_key) = (code_key(identifier), attempts_key(identifier));
        let ttl = self.ttl.as_secs();
        let stored = code.clone();
        self.redis
            .run(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .cmd("SET")
                    .arg(otp_key)
                    .arg(stored)
                    .arg("EX")
                    .arg(ttl)
                    .ignore()
                    .cmd("DEL")
                    .arg(counter_key)
                    .ignore()
                    .query_async::<_, ()>(&mut conn)
                    .await
            })
            .await?;
        debug!("issued otp for {}", identifier);
        Ok(code)
    }

    pub async fn verify(&self, identifier: &str, code: &str) -> AppResult<OtpCheck> {
        let (otp_key, counter_key) = (code_key(identifier), attempts_key(identifier));
        let guess = code.to_string();
        let (max_attempts, ttl) = (self.max_attempts, self.ttl.as_secs());
        let outcome: i64 = self
            .redis
            .run(|mut conn| async move {
                redis::Script::new(VERIFY_SCRIPT)
                    .key(otp_key)
                    .key(counter_key)
                    .arg(guess)
                    .arg(max_attempts)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(OtpCheck::from(outcome))
    }

    /**
     * Remember that the hosted provider vouched for `identifier`
     */
    pub async fn mark_verified(&self, identifier: &str) -> AppResult<()> {
        let key = verified_key(identifier);
        let ttl = self.verified_ttl.as_secs();
        self.redis
            .run(|mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(1)
                    .arg("EX")
                    .arg(ttl)
                    .query_async::<_, ()>(&mut conn)
                    .await
            })
            .await?;
        Ok(())
    }

    /**
     * Consume the provider's verification marker, true if there was one
     */
    pub async fn take_verified(&self, identifier: &str) -> AppResult<bool> {
        let key = verified_key(identifier);
        let (_, removed): (Option<String>, i64) = self
            .redis
            .run(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .cmd("GET")
                    .arg(&key)
                    .cmd("DEL")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(removed > 0)
    }
}
