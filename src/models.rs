use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/**
 * Somebody who has proven they own an email address or a phone number
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub poll_name: String,
    pub title: String,
    pub description: String,
    pub created_by: Uuid,
    pub shareable_link: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_text: String,
    pub position: i32,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub user_id: Uuid,
    pub voted_at: DateTime<Utc>,
}

/**
 * One row of a tally: an option and how many ballots picked it
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OptionCount {
    pub id: Uuid,
    pub option_text: String,
    pub votes: i64,
}

/**
 * Who voted for what, joined through users and poll_options
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct VoterChoice {
    pub identifier: String,
    pub option_text: String,
}
