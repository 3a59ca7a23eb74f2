use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::SharedConnection;
use crate::identifier::{Channel, Identifier};

pub const TYPE_EMAIL_OTP: &str = "email:send_otp";
pub const TYPE_SMS_OTP: &str = "sms:send_otp";
pub const DEAD_LETTER_KEY: &str = "queue:dead";

/**
 * Named queues and their share of the worker's attention
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    Critical,
    Default,
    Low,
}

impl Queue {
    pub const ALL: [Queue; 3] = [Queue::Critical, Queue::Default, Queue::Low];

    pub fn weight(self) -> u32 {
        match self {
            Queue::Critical => 6,
            Queue::Default => 3,
            Queue::Low => 1,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Queue::Critical => "queue:critical",
            Queue::Default => "queue:default",
            Queue::Low => "queue:low",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpPayload {
    pub identifier: String,
    pub otp: String,
}

/**
 * A unit of work as it sits in redis
 */
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: String,
    pub queue: Queue,
    pub payload: OtpPayload,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(kind: &str, payload: OtpPayload) -> Self {
        Task {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            queue: Queue::Default,
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn email_otp(identifier: &str, otp: &str) -> Self {
        Self::new(
            TYPE_EMAIL_OTP,
            OtpPayload {
                identifier: identifier.to_string(),
                otp: otp.to_string(),
            },
        )
    }

    pub fn sms_otp(identifier: &str, otp: &str) -> Self {
        Self::new(
            TYPE_SMS_OTP,
            OtpPayload {
                identifier: identifier.to_string(),
                otp: otp.to_string(),
            },
        )
    }

    /**
     * The delivery task matching the identifier's channel
     */
    pub fn otp_delivery(identifier: &Identifier, otp: &str) -> Self {
        match identifier.channel() {
            Channel::Email => Self::email_otp(identifier.as_str(), otp),
            Channel::Sms => Self::sms_otp(identifier.as_str(), otp),
        }
    }
}

pub async fn enqueue(redis: &SharedConnection, task: &Task) -> Result<(), redis::RedisError> {
    let key = task.queue.key();
    redis
        .run(|mut conn| async move { push(&mut conn, key, task).await })
        .await
}

pub(crate) async fn push<C>(conn: &mut C, key: &str, task: &Task) -> Result<(), redis::RedisError>
where
    C: redis::aio::ConnectionLike + Send,
{
    let encoded = serde_json::to_string(task).map_err(|err| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "task serialization failed",
            err.to_string(),
        ))
    })?;
    redis::cmd("LPUSH")
        .arg(key)
        .arg(encoded)
        .query_async::<_, i64>(conn)
        .await?;
    Ok(())
}

/**
 * Order queue keys for one BRPOP
 *
 * The first queue is drawn by weight and the rest follow in priority order, so over many polls a
 * busy `critical` queue gets roughly six times the turns of `low` without starving it.
 */
pub fn weighted_order<R: Rng>(rng: &mut R) -> Vec<&'static str> {
    let total: u32 = Queue::ALL.iter().map(|q| q.weight()).sum();
    let mut pick = rng.gen_range(0..total);
    let mut first = Queue::Critical;
    for queue in Queue::ALL.iter() {
        if pick < queue.weight() {
            first = *queue;
            break;
        }
        pick -= queue.weight();
    }

    let mut order = vec![first.key()];
    order.extend(Queue::ALL.iter().filter(|q| **q != first).map(|q| q.key()));
    order
}
