use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OptionCount, Poll, PollOption};

/**
 * Body for register, login and plain OTP requests
 */
#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub identifier: String,
    pub otp: String,
}

/**
 * Body for starting a hosted-provider verification
 */
#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct OtpResponse {
    pub message: &'static str,
    pub identifier: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/**
 * User-provided details to create a Poll
 */
#[derive(Debug, Deserialize)]
pub struct PollCreateRequest {
    #[serde(default)]
    pub poll_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /**
     * Just the text of each option, in display order
     */
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PollCreated {
    pub poll_id: Uuid,
    pub public_url: String,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub poll_name: String,
}

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: Uuid,
    pub text: String,
}

impl From<PollOption> for OptionView {
    fn from(option: PollOption) -> Self {
        OptionView {
            id: option.id,
            text: option.option_text,
        }
    }
}

/**
 * Information about a poll
 */
#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub id: Uuid,
    pub poll_name: String,
    pub title: String,
    pub description: String,
    pub options: Vec<OptionView>,
    pub created_at: DateTime<Utc>,
    pub public_url: String,
    pub created_by: Uuid,
}

impl PollResponse {
    pub fn new(poll: Poll, options: Vec<PollOption>) -> Self {
        PollResponse {
            id: poll.id,
            poll_name: poll.poll_name,
            title: poll.title,
            description: poll.description,
            options: options.into_iter().map(OptionView::from).collect(),
            created_at: poll.created_at,
            public_url: poll.shareable_link,
            created_by: poll.created_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PollSummary {
    pub id: Uuid,
    pub poll_name: String,
    pub title: String,
    pub public_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<Poll> for PollSummary {
    fn from(poll: Poll) -> Self {
        PollSummary {
            id: poll.id,
            poll_name: poll.poll_name,
            title: poll.title,
            public_url: poll.shareable_link,
            created_at: poll.created_at,
        }
    }
}

/**
 * A single ballot
 */
#[derive(Debug, Deserialize)]
pub struct Ballot {
    pub option_id: String,
}

#[derive(Debug, Serialize)]
pub struct VoteReceipt {
    pub message: &'static str,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub user_id: Uuid,
}

/**
 * Results from a given poll
 */
#[derive(Debug, Serialize)]
pub struct Tally {
    pub poll_id: Uuid,
    pub title: String,
    pub total_votes: i64,
    pub options: Vec<OptionCount>,
}

impl Tally {
    pub fn new(poll: &Poll, options: Vec<OptionCount>) -> Self {
        Tally {
            poll_id: poll.id,
            title: poll.title.clone(),
            total_votes: options.iter().map(|o| o.votes).sum(),
            options,
        }
    }
}
