use serde::de::DeserializeOwned;
use tide::http::mime::{self, Mime};
use tide::{Body, Request};
use uuid::Uuid;

use crate::api_models::StatusResponse;
use crate::error::{AppError, AppResult};
use crate::token::AuthUser;
use crate::AppState;

pub mod auth;
pub mod polls;

/**
 *  GET /
 */
pub async fn index(_req: Request<AppState>) -> tide::Result<Body> {
    Body::from_json(&StatusResponse {
        status: "ok",
        message: None,
    })
}

/**
 * Parse the JSON body, reporting any malformed input as a bad request
 */
pub(crate) async fn json_body<T: DeserializeOwned>(req: &mut Request<AppState>) -> AppResult<T> {
    req.body_json::<T>()
        .await
        .map_err(|_| AppError::BadRequest("Invalid request".to_string()))
}

/**
 * Like `json_body`, but also takes `application/x-www-form-urlencoded`
 *
 * The hosted provider and plain HTML forms post url-encoded bodies.
 */
pub(crate) async fn json_or_form_body<T: DeserializeOwned>(req: &mut Request<AppState>) -> AppResult<T> {
    if is_form(req.content_type().as_ref()) {
        req.body_form::<T>()
            .await
            .map_err(|_| AppError::BadRequest("Invalid request".to_string()))
    } else {
        json_body(req).await
    }
}

fn is_form(content_type: Option<&Mime>) -> bool {
    content_type
        .map(|mime| mime.essence() == mime::FORM.essence())
        .unwrap_or(false)
}

pub(crate) fn uuid_param(req: &Request<AppState>, name: &str) -> AppResult<Uuid> {
    let raw = req
        .param(name)
        .map_err(|_| AppError::BadRequest(format!("Missing {}", name)))?;
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid {}", name)))
}

pub(crate) fn auth_user(req: &Request<AppState>) -> AppResult<AuthUser> {
    req.ext::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
}

/**
 * The externally visible origin, used for share links and provider callbacks
 */
pub(crate) fn public_base(req: &Request<AppState>) -> String {
    match &req.state().config.public_url {
        Some(url) => url.clone(),
        None => req.url().origin().ascii_serialization(),
    }
}
