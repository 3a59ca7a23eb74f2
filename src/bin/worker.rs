use anyhow::Context;
use log::*;
use std::sync::Arc;

use otpvote::config::Config;
use otpvote::notify::{Mailer, OtpSender, SmsSender};
use otpvote::worker::{self, Senders};

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let config = Config::from_env()?;
    let client = redis::Client::open(config.redis_url.as_str()).context("parsing REDIS_URL")?;

    let email: Option<Arc<dyn OtpSender>> = match Mailer::new(&config.smtp) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(err) => {
            warn!("email delivery disabled: {}", err);
            None
        }
    };
    let sms: Option<Arc<dyn OtpSender>> = match SmsSender::new(&config.twilio) {
        Ok(sender) => Some(Arc::new(sender)),
        Err(err) => {
            warn!("sms delivery disabled: {}", err);
            None
        }
    };

    worker::run(
        client,
        Senders { email, sms },
        config.worker_concurrency,
        config.job_max_retry,
    )
    .await;
    Ok(())
}
