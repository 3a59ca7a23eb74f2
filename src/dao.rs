use chrono::Utc;
use log::*;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{OptionCount, Poll, PollOption, User, Vote, VoterChoice};

/**
 * Create the sqlx connection pool for postgresql
 */
pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/**
 * Return the user owning `identifier`, creating them on first sight
 */
pub async fn upsert_user(pool: &PgPool, identifier: &str) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, identifier) VALUES ($1, $2)
         ON CONFLICT (identifier) DO UPDATE SET identifier = EXCLUDED.identifier
         RETURNING id, identifier, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(identifier)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn find_user(pool: &PgPool, identifier: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, identifier, created_at FROM users WHERE identifier = $1",
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/**
 * Everything needed to insert a poll and its options
 */
pub struct NewPoll<'a> {
    pub poll_name: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub created_by: Uuid,
    pub options: &'a [String],
}

/**
 * Insert the poll and all of its options in a single transaction
 *
 * `link_for` receives the new poll id and produces the shareable link stored with it.
 */
pub async fn create_poll<F>(
    pool: &PgPool,
    new: NewPoll<'_>,
    link_for: F,
) -> AppResult<(Poll, Vec<PollOption>)>
where
    F: FnOnce(Uuid) -> String,
{
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    let poll = sqlx::query_as::<_, Poll>(
        "INSERT INTO polls (id, poll_name, title, description, created_by, shareable_link, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id, poll_name, title, description, created_by, shareable_link, created_at",
    )
    .bind(id)
    .bind(new.poll_name)
    .bind(new.title)
    .bind(new.description)
    .bind(new.created_by)
    .bind(link_for(id))
    .bind(Utc::now())
    .fetch_one(&mut tx)
    .await?;

    let mut options = Vec::with_capacity(new.options.len());
    for (position, text) in new.options.iter().enumerate() {
        let option = sqlx::query_as::<_, PollOption>(
            "INSERT INTO poll_options (id, poll_id, option_text, position)
             VALUES ($1, $2, $3, $4)
             RETURNING id, poll_id, option_text, position",
        )
        .bind(Uuid::new_v4())
        .bind(poll.id)
        .bind(text)
        .bind(position as i32)
        .fetch_one(&mut tx)
        .await?;
        options.push(option);
    }

    tx.commit().await?;
    debug!("inserted poll {} with {} options", poll.id, options.len());
    Ok((poll, options))
}

pub async fn find_poll(pool: &PgPool, id: Uuid) -> AppResult<Option<Poll>> {
    let poll = sqlx::query_as::<_, Poll>(
        "SELECT id, poll_name, title, description, created_by, shareable_link, created_at
         FROM polls WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(poll)
}

pub async fn polls_by_creator(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<Poll>> {
    let polls = sqlx::query_as::<_, Poll>(
        "SELECT id, poll_name, title, description, created_by, shareable_link, created_at
         FROM polls WHERE created_by = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(polls)
}

pub async fn poll_options(pool: &PgPool, poll_id: Uuid) -> AppResult<Vec<PollOption>> {
    let options = sqlx::query_as::<_, PollOption>(
        "SELECT id, poll_id, option_text, position
         FROM poll_options WHERE poll_id = $1 ORDER BY position ASC",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(options)
}

pub async fn find_option(
    pool: &PgPool,
    poll_id: Uuid,
    option_id: Uuid,
) -> AppResult<Option<PollOption>> {
    let option = sqlx::query_as::<_, PollOption>(
        "SELECT id, poll_id, option_text, position
         FROM poll_options WHERE id = $1 AND poll_id = $2",
    )
    .bind(option_id)
    .bind(poll_id)
    .fetch_optional(pool)
    .await?;
    Ok(option)
}

/**
 * Record a ballot, one per user per poll
 */
pub async fn insert_vote(
    pool: &PgPool,
    poll_id: Uuid,
    option_id: Uuid,
    user_id: Uuid,
) -> AppResult<Vote> {
    let result = sqlx::query_as::<_, Vote>(
        "INSERT INTO votes (id, poll_id, option_id, user_id, voted_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, poll_id, option_id, user_id, voted_at",
    )
    .bind(Uuid::new_v4())
    .bind(poll_id)
    .bind(option_id)
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await;

    match result {
        Ok(vote) => Ok(vote),
        Err(err) if AppError::is_unique_violation(&err) => Err(AppError::Conflict(
            "User has already voted for this poll".to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}

/**
 * Count ballots per option, in option order, including options nobody picked
 */
pub async fn tally(pool: &PgPool, poll_id: Uuid) -> AppResult<Vec<OptionCount>> {
    let counts = sqlx::query_as::<_, OptionCount>(
        "SELECT o.id, o.option_text, COUNT(v.id) AS votes
         FROM poll_options o
         LEFT JOIN votes v ON v.option_id = o.id
         WHERE o.poll_id = $1
         GROUP BY o.id, o.option_text, o.position
         ORDER BY o.position ASC",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(counts)
}

pub async fn voter_choices(pool: &PgPool, poll_id: Uuid) -> AppResult<Vec<VoterChoice>> {
    let rows = sqlx::query_as::<_, VoterChoice>(
        "SELECT users.identifier, poll_options.option_text
         FROM votes
         JOIN users ON users.id = votes.user_id
         JOIN poll_options ON poll_options.id = votes.option_id
         WHERE votes.poll_id = $1
         ORDER BY votes.voted_at ASC",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
