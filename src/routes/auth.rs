use log::*;
use tide::{Body, Request, Response, StatusCode};

use super::{json_body, json_or_form_body, public_base};
use crate::api_models::{
    AuthResponse, MessageResponse, OtpRequest, OtpResponse, PhoneRequest, StatusResponse,
    VerifyRequest,
};
use crate::dao;
use crate::error::{AppError, AppResult};
use crate::identifier::Identifier;
use crate::jobs::{self, Task};
use crate::otp::{self, OtpCheck};
use crate::provider::Callback;
use crate::AppState;

/**
 * Store a fresh code and queue its delivery on the identifier's channel
 */
async fn issue_and_enqueue(state: &AppState, identifier: &Identifier) -> AppResult<()> {
    let code = state.otp.issue(identifier.as_str()).await?;
    jobs::enqueue(&state.redis, &Task::otp_delivery(identifier, &code)).await?;
    info!("queued OTP delivery for {} via {:?}", identifier, identifier.channel());
    Ok(())
}

async fn access_token(state: &AppState, identifier: &Identifier) -> AppResult<Body> {
    let user = dao::upsert_user(&state.db, identifier.as_str()).await?;
    let access_token = state.tokens.issue(user.id, &user.identifier)?;
    Body::from_json(&AuthResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.tokens.ttl().as_secs(),
    })
    .map_err(|err| AppError::Internal(err.to_string()))
}

fn otp_sent(message: &'static str, identifier: &Identifier) -> tide::Result<Body> {
    Body::from_json(&OtpResponse {
        message,
        identifier: identifier.to_string(),
    })
}

/**
 *  POST /auth/register
 */
pub async fn register(mut req: Request<AppState>) -> tide::Result<Body> {
    let body: OtpRequest = json_body(&mut req).await?;
    let identifier = Identifier::parse(&body.identifier)?;

    let user = dao::upsert_user(&req.state().db, identifier.as_str()).await?;
    debug!("registered user {}", user.id);
    issue_and_enqueue(req.state(), &identifier).await?;
    otp_sent("OTP sent for registration", &identifier)
}

/**
 *  POST /auth/login
 */
pub async fn login(mut req: Request<AppState>) -> tide::Result<Body> {
    let body: OtpRequest = json_body(&mut req).await?;
    let identifier = Identifier::parse(&body.identifier)?;

    if dao::find_user(&req.state().db, identifier.as_str()).await?.is_none() {
        return Err(AppError::NotFound("User not registered".to_string()).into());
    }
    issue_and_enqueue(req.state(), &identifier).await?;
    otp_sent("OTP sent for login", &identifier)
}

/**
 *  POST /auth/otp/send
 */
pub async fn send_otp(mut req: Request<AppState>) -> tide::Result<Body> {
    let body: OtpRequest = json_body(&mut req).await?;
    let identifier = Identifier::parse(&body.identifier)?;
    issue_and_enqueue(req.state(), &identifier).await?;
    otp_sent("OTP sent successfully", &identifier)
}

/**
 *  POST /auth/otp/verify
 */
pub async fn verify_otp(mut req: Request<AppState>) -> tide::Result<Body> {
    let body: VerifyRequest = json_body(&mut req).await?;
    let identifier = Identifier::parse(&body.identifier)?;
    let code = body.otp.trim();
    if !otp::is_well_formed(code) {
        return Err(AppError::BadRequest("OTP must be 6 digits".to_string()).into());
    }

    match req.state().otp.verify(identifier.as_str(), code).await? {
        OtpCheck::Verified => Ok(access_token(req.state(), &identifier).await?),
        OtpCheck::Mismatch | OtpCheck::Missing => {
            Err(AppError::Unauthorized("invalid OTP".to_string()).into())
        }
    }
}

/**
 *  POST /auth/logout
 *
 * Tokens are stateless, forgetting them is up to the client
 */
pub async fn logout(_req: Request<AppState>) -> tide::Result<Body> {
    Body::from_json(&MessageResponse {
        message: "Logged out. Please delete JWT token on client side.",
    })
}

/**
 *  POST /auth/request
 */
pub async fn request_provider_otp(mut req: Request<AppState>) -> tide::Result<Body> {
    let body: PhoneRequest = json_or_form_body(&mut req).await?;
    let phone = Identifier::parse(&body.phone)
        .map_err(|_| AppError::BadRequest("Invalid phone number".to_string()))?;
    if phone.channel() != crate::identifier::Channel::Sms {
        return Err(AppError::BadRequest("Invalid phone number".to_string()).into());
    }

    let base = public_base(&req);
    let reply = req.state().provider.request(phone.as_str(), &base).await?;
    Body::from_json(&reply)
}

/**
 *  POST /auth/callback
 *
 * Anything other than a verified status is acknowledged and dropped
 */
pub async fn provider_callback(mut req: Request<AppState>) -> tide::Result<Response> {
    let payload: Callback = json_or_form_body(&mut req)
        .await
        .map_err(|_| AppError::BadRequest("Invalid callback payload".to_string()))?;

    if !payload.is_verified() {
        debug!("ignoring callback {} with status {:?}", payload.otp_id, payload.auth_status);
        return Ok(Response::new(StatusCode::Ok));
    }

    let phone = Identifier::parse(&payload.phone_sms)?;
    req.state().otp.mark_verified(phone.as_str()).await?;
    info!("provider verified {}", phone);
    Ok(Response::new(StatusCode::Ok))
}

/**
 *  POST /auth/token
 */
pub async fn exchange_verified(mut req: Request<AppState>) -> tide::Result<Body> {
    let body: OtpRequest = json_body(&mut req).await?;
    let identifier = Identifier::parse(&body.identifier)?;

    if !req.state().otp.take_verified(identifier.as_str()).await? {
        return Err(AppError::Unauthorized("OTP verification required".to_string()).into());
    }
    Ok(access_token(req.state(), &identifier).await?)
}

/**
 *  GET /auth/success
 */
pub async fn success(_req: Request<AppState>) -> tide::Result<Body> {
    Body::from_json(&StatusResponse {
        status: "success",
        message: Some("OTP verified successfully. You may proceed."),
    })
}

/**
 *  GET /auth/failure
 */
pub async fn failure(_req: Request<AppState>) -> tide::Result<Body> {
    Body::from_json(&StatusResponse {
        status: "failure",
        message: Some("OTP verification failed. Please try again."),
    })
}
