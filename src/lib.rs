use std::sync::Arc;

use sqlx::postgres::PgPool;
use tide::Server;

pub mod api_models;
pub mod cache;
pub mod config;
pub mod dao;
pub mod error;
pub mod identifier;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod otp;
pub mod provider;
pub mod routes;
pub mod token;
pub mod worker;

use crate::cache::SharedConnection;
use crate::config::{Config, OtpMode};
use crate::middleware::{JwtAuth, RateLimiter};
use crate::otp::OtpStore;
use crate::provider::OtpProvider;
use crate::token::TokenIssuer;

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: SharedConnection,
    pub otp: OtpStore,
    pub tokens: TokenIssuer,
    pub provider: OtpProvider,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, client: redis::Client) -> Self {
        let redis = SharedConnection::new(client);
        AppState {
            otp: OtpStore::new(
                redis.clone(),
                config.otp_ttl,
                config.otp_max_attempts,
                config.otp_verified_ttl,
            ),
            tokens: TokenIssuer::new(&config.jwt_secret, config.jwt_ttl),
            provider: OtpProvider::new(config.provider.clone()),
            config: Arc::new(config),
            db,
            redis,
        }
    }
}

/**
 * Assemble the tide server with every route and middleware
 *
 * Which OTP routes exist depends on `OTP_MODE`: local mode owns register/login/otp, provider mode
 * owns request/callback/token.
 */
pub fn build_app(state: AppState) -> tide::Result<Server<AppState>> {
    let limiter = RateLimiter::new(
        state.config.rate_limit_max,
        state.config.rate_limit_window,
        state.config.trust_forwarded_for,
    );
    let mode = state.config.otp_mode;

    let mut app = tide::with_state(state);
    app.with(tide::log::LogMiddleware::new());
    app.with(tide::utils::After(error::render_errors));
    app.with(middleware::cors()?);
    app.with(limiter);

    app.at("/").get(routes::index);
    app.at("/auth/logout").post(routes::auth::logout);

    match mode {
        OtpMode::Local => {
            app.at("/auth/register").post(routes::auth::register);
            app.at("/auth/login").post(routes::auth::login);
            app.at("/auth/otp/send").post(routes::auth::send_otp);
            app.at("/auth/otp/verify").post(routes::auth::verify_otp);
        }
        OtpMode::Provider => {
            app.at("/auth/request").post(routes::auth::request_provider_otp);
            app.at("/auth/callback").post(routes::auth::provider_callback);
            app.at("/auth/token").post(routes::auth::exchange_verified);
            app.at("/auth/success").get(routes::auth::success);
            app.at("/auth/failure").get(routes::auth::failure);
        }
    }

    app.at("/polls")
        .with(JwtAuth)
        .post(routes::polls::create)
        .get(routes::polls::list);
    app.at("/polls/:poll_id").with(JwtAuth).get(routes::polls::get);
    app.at("/polls/:poll_id/vote").with(JwtAuth).post(routes::polls::vote);
    app.at("/polls/:poll_id/results").with(JwtAuth).get(routes::polls::results);
    app.at("/polls/:poll_id/votes").with(JwtAuth).get(routes::polls::voters);

    Ok(app)
}
