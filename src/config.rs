use log::*;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_JWT_SECRET: &str = "supersecret";

/**
 * How one-time passwords are produced and checked
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpMode {
    /**
     * Codes are generated here, stored in redis and delivered by the worker
     */
    Local,
    /**
     * Codes are generated and verified by a hosted OTP service which calls back on success
     */
    Provider,
}

impl FromStr for OtpMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(OtpMode::Local),
            "provider" => Ok(OtpMode::Provider),
            other => Err(ConfigError::Invalid("OTP_MODE", other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_token: String,
}

/**
 * Everything both binaries read from the environment
 */
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub public_url: Option<String>,
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub otp_mode: OtpMode,
    pub otp_ttl: Duration,
    pub otp_max_attempts: u32,
    pub otp_verified_ttl: Duration,
    pub provider: ProviderConfig,
    pub smtp: SmtpConfig,
    pub twilio: TwilioConfig,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub trust_forwarded_for: bool,
    pub worker_concurrency: usize,
    pub job_max_retry: u32,
}

impl Config {
    /**
     * Load `.env` if there is one, then read the process environment
     */
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_err() {
            info!(".env file not found, relying on environment variables");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, fallback: &str| lookup(key).unwrap_or_else(|| fallback.to_string());

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                get("PG_USER", "postgres"),
                get("PG_PASSWORD", ""),
                get("PG_HOST", "localhost"),
                get("PG_PORT", "5432"),
                get("PG_DBNAME", "postgres"),
            ),
        };

        let redis_url = match lookup("REDIS_URL") {
            Some(url) => url,
            None => redis_url(
                &get("REDIS_ADDR", "localhost:6379"),
                &get("REDIS_USERNAME", ""),
                &get("REDIS_PASSWORD", ""),
            ),
        };

        let jwt_secret = get("JWT_SECRET", DEFAULT_JWT_SECRET);
        if jwt_secret == DEFAULT_JWT_SECRET {
            warn!("JWT_SECRET is not set, tokens are signed with the built-in development secret");
        }

        let smtp_user = get("SMTP_USER", "");

        Ok(Config {
            bind_addr: get("BIND_ADDR", "0.0.0.0:8080"),
            public_url: lookup("PUBLIC_URL").map(|url| url.trim_end_matches('/').to_string()),
            database_url,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            run_migrations: parse(&lookup, "RUN_MIGRATIONS", true)?,
            redis_url,
            jwt_secret,
            jwt_ttl: Duration::from_secs(parse(&lookup, "JWT_TTL", 3600)?),
            otp_mode: get("OTP_MODE", "local").parse()?,
            otp_ttl: Duration::from_secs(parse(&lookup, "OTP_TTL", 300)?),
            otp_max_attempts: parse(&lookup, "OTP_MAX_ATTEMPTS", 5)?,
            otp_verified_ttl: Duration::from_secs(parse(&lookup, "OTP_VERIFIED_TTL", 600)?),
            provider: ProviderConfig {
                api_url: get("OTP_API_URL", "https://otp.dev/api/verify/"),
                api_key: get("OTP_API_KEY", ""),
                api_token: get("OTP_API_TOKEN", ""),
            },
            smtp: SmtpConfig {
                host: get("SMTP_HOST", ""),
                port: parse(&lookup, "SMTP_PORT", 587)?,
                from: get("SMTP_FROM", &smtp_user),
                user: smtp_user,
                pass: get("SMTP_PASS", ""),
            },
            twilio: TwilioConfig {
                account_sid: get("TWILIO_ACCOUNT_SID", ""),
                auth_token: get("TWILIO_AUTH_TOKEN", ""),
                phone_number: get("TWILIO_PHONE_NUMBER", ""),
                api_url: get("TWILIO_API_URL", "https://api.twilio.com")
                    .trim_end_matches('/')
                    .to_string(),
            },
            rate_limit_max: parse(&lookup, "RATE_LIMIT_MAX", 5000)?,
            rate_limit_window: Duration::from_secs(parse(&lookup, "RATE_LIMIT_WINDOW", 60)?),
            trust_forwarded_for: parse(&lookup, "TRUST_FORWARDED_FOR", false)?,
            worker_concurrency: parse(&lookup, "WORKER_CONCURRENCY", 10)?,
            job_max_retry: parse(&lookup, "JOB_MAX_RETRY", 5)?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, fallback: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(fallback),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
    }
}

fn redis_url(addr: &str, username: &str, password: &str) -> String {
    match (username.is_empty(), password.is_empty()) {
        (_, true) => format!("redis://{}/", addr),
        (true, false) => format!("redis://:{}@{}/", password, addr),
        (false, false) => format!("redis://{}:{}@{}/", username, password, addr),
    }
}
