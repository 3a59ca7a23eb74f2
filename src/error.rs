use log::*;
use serde::Serialize;
use tide::{Body, Response, StatusCode};

/**
 * Every failure a handler can report
 *
 * Handlers return `tide::Result` and bubble these up with `?`, the `render_errors` middleware then
 * turns them into a status code and a JSON body.
 */
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("too many requests")]
    TooManyRequests,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BadRequest,
            AppError::Unauthorized(_) => StatusCode::Unauthorized,
            AppError::Forbidden(_) => StatusCode::Forbidden,
            AppError::NotFound(_) => StatusCode::NotFound,
            AppError::Conflict(_) => StatusCode::Conflict,
            AppError::TooManyRequests => StatusCode::TooManyRequests,
            AppError::Upstream(_) => StatusCode::BadGateway,
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Token(_)
            | AppError::Internal(_) => StatusCode::InternalServerError,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TooManyRequests => "TOO_MANY_REQUESTS",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::Token(_) => "TOKEN_ERROR",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /**
     * The message safe to hand back to a client
     */
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Cache(_) => "Cache operation failed".to_string(),
            AppError::Token(_) => "Could not generate token".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind(),
            message: self.public_message(),
        }
    }

    /**
     * True when a database error is a unique constraint violation
     */
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

/**
 * Rewrites any error response into the JSON error envelope
 */
pub async fn render_errors(mut res: Response) -> tide::Result {
    let rendered = if let Some(err) = res.downcast_error::<AppError>() {
        if err.status().is_server_error() {
            error!("{}", err);
        }
        Some((err.status(), err.to_response()))
    } else if let Some(err) = res.error() {
        let status = err.status();
        Some((
            status,
            ErrorResponse {
                error: status.canonical_reason(),
                message: err.to_string(),
            },
        ))
    } else {
        None
    };

    if let Some((status, body)) = rendered {
        res.set_status(status);
        res.set_body(Body::from_json(&body)?);
    }
    Ok(res)
}
