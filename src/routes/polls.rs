use log::*;
use tide::{Body, Request, Response, StatusCode};
use uuid::Uuid;

use super::{auth_user, json_body, public_base, uuid_param};
use crate::api_models::{
    Ballot, PollCreateRequest, PollCreated, PollResponse, PollSummary, Tally, VoteReceipt,
};
use crate::dao::{self, NewPoll};
use crate::error::{AppError, AppResult};
use crate::models::Poll;
use crate::AppState;

/**
 * Trim the title and options and insist on at least two distinct, non-empty options
 */
pub fn validate_poll(req: &PollCreateRequest) -> AppResult<(String, Vec<String>)> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let options: Vec<String> = req.options.iter().map(|o| o.trim().to_string()).collect();
    if options.len() < 2 {
        return Err(AppError::BadRequest("At least 2 options required".to_string()));
    }
    if options.iter().any(|o| o.is_empty()) {
        return Err(AppError::BadRequest("Options cannot be empty".to_string()));
    }
    for (i, option) in options.iter().enumerate() {
        if options[..i].contains(option) {
            return Err(AppError::BadRequest("Poll options must be unique".to_string()));
        }
    }
    Ok((title.to_string(), options))
}

pub fn share_link(base: &str, poll_id: Uuid) -> String {
    format!("{}/polls/{}", base, poll_id)
}

async fn requested_poll(req: &Request<AppState>) -> AppResult<Poll> {
    let poll_id = uuid_param(req, "poll_id")?;
    debug!("Fetching poll: {}", poll_id);
    dao::find_poll(&req.state().db, poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))
}

/**
 *  POST /polls
 */
pub async fn create(mut req: Request<AppState>) -> tide::Result<Response> {
    let user = auth_user(&req)?;
    let body: PollCreateRequest = json_body(&mut req).await?;
    let (title, options) = validate_poll(&body)?;
    let base = public_base(&req);

    let (poll, _) = dao::create_poll(
        &req.state().db,
        NewPoll {
            poll_name: body.poll_name.trim(),
            title: &title,
            description: body.description.trim(),
            created_by: user.id,
            options: &options,
        },
        |id| share_link(&base, id),
    )
    .await?;
    info!("{} created poll {}", user.identifier, poll.id);

    let created = PollCreated {
        poll_id: poll.id,
        public_url: poll.shareable_link,
        title: poll.title,
        description: poll.description,
        options,
        created_by: poll.created_by,
        created_at: poll.created_at,
        poll_name: poll.poll_name,
    };
    Ok(Response::builder(StatusCode::Created)
        .body(Body::from_json(&created)?)
        .build())
}

/**
 *  GET /polls
 */
pub async fn list(req: Request<AppState>) -> tide::Result<Body> {
    let user = auth_user(&req)?;
    let polls = dao::polls_by_creator(&req.state().db, user.id).await?;
    let summaries: Vec<PollSummary> = polls.into_iter().map(PollSummary::from).collect();
    Body::from_json(&summaries)
}

/**
 *  GET /polls/:poll_id
 */
pub async fn get(req: Request<AppState>) -> tide::Result<Body> {
    let poll = requested_poll(&req).await?;
    let options = dao::poll_options(&req.state().db, poll.id).await?;
    Body::from_json(&PollResponse::new(poll, options))
}

/**
 *  POST /polls/:poll_id/vote
 */
pub async fn vote(mut req: Request<AppState>) -> tide::Result<Body> {
    let user = auth_user(&req)?;
    let poll_id = uuid_param(&req, "poll_id")?;
    let ballot: Ballot = json_body(&mut req).await?;
    let option_id = Uuid::parse_str(ballot.option_id.trim())
        .map_err(|_| AppError::BadRequest("Invalid option_id".to_string()))?;

    let db = &req.state().db;
    if dao::find_poll(db, poll_id).await?.is_none() {
        return Err(AppError::NotFound("Poll not found".to_string()).into());
    }
    if dao::find_option(db, poll_id, option_id).await?.is_none() {
        return Err(AppError::BadRequest("Option does not belong to poll".to_string()).into());
    }

    let vote = dao::insert_vote(db, poll_id, option_id, user.id).await?;
    info!("Ballot received: {} voted in poll {}", user.id, poll_id);

    Body::from_json(&VoteReceipt {
        message: "Vote cast successfully",
        poll_id: vote.poll_id,
        option_id: vote.option_id,
        user_id: vote.user_id,
    })
}

/**
 *  GET /polls/:poll_id/results
 */
pub async fn results(req: Request<AppState>) -> tide::Result<Body> {
    let poll = requested_poll(&req).await?;
    let counts = dao::tally(&req.state().db, poll.id).await?;
    Body::from_json(&Tally::new(&poll, counts))
}

/**
 *  GET /polls/:poll_id/votes
 *
 * Reveals who voted for what, so only the poll's creator may look
 */
pub async fn voters(req: Request<AppState>) -> tide::Result<Body> {
    let user = auth_user(&req)?;
    let poll = requested_poll(&req).await?;
    if poll.created_by != user.id {
        return Err(AppError::Forbidden("Only the poll creator can see voters".to_string()).into());
    }
    let rows = dao::voter_choices(&req.state().db, poll.id).await?;
    Body::from_json(&rows)
}
