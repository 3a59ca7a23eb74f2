use async_std::task;
use log::*;
use std::sync::Arc;
use std::time::Duration;

use crate::jobs::{self, Task, DEAD_LETTER_KEY, TYPE_EMAIL_OTP, TYPE_SMS_OTP};
use crate::notify::{NotifyError, OtpSender};

const POLL_TIMEOUT_SECS: u64 = 2;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown task kind {0:?}")]
    UnknownKind(String),
    #[error("no sender configured for {0}")]
    NoSender(&'static str),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/**
 * Delivery backends, either may be missing when its credentials are
 */
#[derive(Clone, Default)]
pub struct Senders {
    pub email: Option<Arc<dyn OtpSender>>,
    pub sms: Option<Arc<dyn OtpSender>>,
}

/**
 * What to do with a task once a handler has had a go at it
 */
#[derive(Debug)]
pub enum Outcome {
    Done,
    Retry(Task),
    Dead(Task),
    Malformed,
}

pub async fn dispatch(task: &Task, senders: &Senders) -> Result<(), JobError> {
    let (sender, name) = match task.kind.as_str() {
        TYPE_EMAIL_OTP => (&senders.email, "email"),
        TYPE_SMS_OTP => (&senders.sms, "sms"),
        other => return Err(JobError::UnknownKind(other.to_string())),
    };
    let sender = sender.as_ref().ok_or(JobError::NoSender(name))?;
    info!("[{}] Sending OTP to {}", name.to_uppercase(), task.payload.identifier);
    sender
        .send_otp(&task.payload.identifier, &task.payload.otp)
        .await?;
    Ok(())
}

/**
 * Decode, run, and decide whether the task goes back on its queue
 */
pub async fn process(raw: &str, senders: &Senders, max_retry: u32) -> Outcome {
    let mut task: Task = match serde_json::from_str(raw) {
        Ok(task) => task,
        Err(err) => {
            error!("dropping undecodable task: {}", err);
            return Outcome::Malformed;
        }
    };

    match dispatch(&task, senders).await {
        Ok(()) => Outcome::Done,
        Err(err) => {
            task.attempts += 1;
            warn!(
                "task {} ({}) failed on attempt {}: {}",
                task.id, task.kind, task.attempts, err
            );
            if task.attempts >= max_retry || matches!(err, JobError::UnknownKind(_)) {
                Outcome::Dead(task)
            } else {
                Outcome::Retry(task)
            }
        }
    }
}

async fn drain(
    worker: usize,
    conn: &mut redis::aio::Connection,
    senders: &Senders,
    max_retry: u32,
) -> Result<(), redis::RedisError> {
    loop {
        let keys = jobs::weighted_order(&mut rand::thread_rng());
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&keys)
            .arg(POLL_TIMEOUT_SECS)
            .query_async(conn)
            .await?;

        let (queue, raw) = match popped {
            Some(popped) => popped,
            None => continue,
        };
        debug!("worker {} took a task from {}", worker, queue);

        match process(&raw, senders, max_retry).await {
            Outcome::Done => {}
            Outcome::Retry(task) => jobs::push(conn, task.queue.key(), &task).await?,
            Outcome::Dead(task) => {
                error!("task {} exhausted after {} attempts", task.id, task.attempts);
                jobs::push(conn, DEAD_LETTER_KEY, &task).await?
            }
            Outcome::Malformed => {
                redis::cmd("LPUSH")
                    .arg(DEAD_LETTER_KEY)
                    .arg(&raw)
                    .query_async::<_, i64>(conn)
                    .await?;
            }
        }
    }
}

async fn work(worker: usize, client: redis::Client, senders: Senders, max_retry: u32) {
    loop {
        let mut conn = match client.get_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                error!("worker {} could not connect to redis: {}", worker, err);
                task::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        if let Err(err) = drain(worker, &mut conn, &senders, max_retry).await {
            error!("worker {} lost redis: {}", worker, err);
            task::sleep(RECONNECT_DELAY).await;
        }
    }
}

/**
 * Run `concurrency` workers until the process is stopped
 */
pub async fn run(client: redis::Client, senders: Senders, concurrency: usize, max_retry: u32) {
    let concurrency = concurrency.max(1);
    info!("starting {} workers", concurrency);
    let handles: Vec<_> = (0..concurrency)
        .map(|worker| task::spawn(work(worker, client.clone(), senders.clone(), max_retry)))
        .collect();
    for handle in handles {
        handle.await;
    }
}
