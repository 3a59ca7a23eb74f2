use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use tide::http::{Method, Request, Response, StatusCode, Url};
use tide::Server;
use uuid::Uuid;

use otpvote::config::Config;
use otpvote::{build_app, AppState};

/**
 * A server whose pool and redis client never connect unless a handler gets as far as I/O
 */
fn app_with(pairs: &[(&str, &str)]) -> Server<AppState> {
    let mut env: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    env.entry("JWT_SECRET".to_string())
        .or_insert_with(|| "integration-secret".to_string());
    env.entry("DATABASE_URL".to_string())
        .or_insert_with(|| "postgres://postgres@127.0.0.1:1/otpvote".to_string());
    env.entry("REDIS_URL".to_string())
        .or_insert_with(|| "redis://127.0.0.1:1/".to_string());

    let config = Config::from_lookup(|key| env.get(key).cloned()).expect("config");
    let db = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    let redis = redis::Client::open(config.redis_url.as_str()).expect("redis url");
    build_app(AppState::new(config, db, redis)).expect("app")
}

fn app() -> Server<AppState> {
    app_with(&[])
}

fn bearer(app: &Server<AppState>) -> String {
    let token = app
        .state()
        .tokens
        .issue(Uuid::new_v4(), "voter@example.com")
        .expect("token");
    format!("Bearer {}", token)
}

fn request(method: Method, path: &str) -> Request {
    Request::new(method, Url::parse(&format!("http://localhost{}", path)).unwrap())
}

fn json_request(method: Method, path: &str, body: Value) -> Request {
    let mut req = request(method, path);
    req.set_body(tide::Body::from_json(&body).unwrap());
    req
}

async fn send(app: &Server<AppState>, req: Request) -> (StatusCode, Value) {
    let mut res: Response = app.respond(req).await.expect("response");
    let status = res.status();
    let body = res.body_string().await.unwrap_or_default();
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

#[async_std::test]
async fn index_reports_ok() {
    let (status, body) = send(&app(), request(Method::Get, "/")).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["status"], "ok");
}

#[async_std::test]
async fn polls_require_a_token() {
    let app = app();
    let (status, body) = send(
        &app,
        json_request(Method::Post, "/polls", json!({"title": "Lunch?", "options": ["a", "b"]})),
    )
    .await;
    assert_eq!(status, StatusCode::Unauthorized);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[async_std::test]
async fn forged_tokens_are_refused() {
    let app = app();
    let other = app_with(&[("JWT_SECRET", "someone-else")]);
    let mut req = request(Method::Get, "/polls");
    req.insert_header("Authorization", bearer(&other));
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::Unauthorized);
}

#[async_std::test]
async fn poll_needs_two_options() {
    let app = app();
    let mut req = json_request(
        Method::Post,
        "/polls",
        json!({"title": "Lunch?", "options": ["Tacos"]}),
    );
    req.insert_header("Authorization", bearer(&app));
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["message"], "At least 2 options required");
}

#[async_std::test]
async fn poll_ids_must_be_uuids() {
    let app = app();
    let mut req = request(Method::Get, "/polls/not-a-uuid");
    req.insert_header("Authorization", bearer(&app));
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["message"], "Invalid poll_id");
}

#[async_std::test]
async fn ballots_need_an_option_uuid() {
    let app = app();
    let path = format!("/polls/{}/vote", Uuid::new_v4());
    let mut req = json_request(Method::Post, &path, json!({"option_id": "tacos"}));
    req.insert_header("Authorization", bearer(&app));
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["message"], "Invalid option_id");
}

#[async_std::test]
async fn malformed_json_is_a_bad_request() {
    let app = app();
    let mut req = request(Method::Post, "/auth/register");
    req.set_body("{not json");
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[async_std::test]
async fn register_rejects_blank_identifier() {
    let (status, _) = send(
        &app(),
        json_request(Method::Post, "/auth/register", json!({"identifier": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
}

#[async_std::test]
async fn verify_rejects_short_codes() {
    let (status, body) = send(
        &app(),
        json_request(
            Method::Post,
            "/auth/otp/verify",
            json!({"identifier": "voter@example.com", "otp": "12"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["message"], "OTP must be 6 digits");
}

#[async_std::test]
async fn logout_is_stateless() {
    let (status, body) = send(&app(), request(Method::Post, "/auth/logout")).await;
    assert_eq!(status, StatusCode::Ok);
    assert!(body["message"].as_str().unwrap().contains("Logged out"));
}

#[async_std::test]
async fn local_mode_hides_provider_routes() {
    let (status, _) = send(
        &app(),
        json_request(Method::Post, "/auth/request", json!({"phone": "+15550100999"})),
    )
    .await;
    assert_eq!(status, StatusCode::NotFound);
}

#[async_std::test]
async fn provider_mode_hides_local_routes() {
    let app = app_with(&[("OTP_MODE", "provider")]);
    let (status, _) = send(
        &app,
        json_request(
            Method::Post,
            "/auth/otp/verify",
            json!({"identifier": "voter@example.com", "otp": "123456"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NotFound);

    let (status, body) = send(&app, request(Method::Get, "/auth/success")).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["status"], "success");
}

#[async_std::test]
async fn unverified_callbacks_are_acknowledged() {
    let app = app_with(&[("OTP_MODE", "provider")]);
    let (status, _) = send(
        &app,
        json_request(
            Method::Post,
            "/auth/callback",
            json!({"otp_id": "abc", "auth_status": "failed", "phone_sms": "+15550100999"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::Ok);
}

#[async_std::test]
async fn provider_needs_credentials() {
    let app = app_with(&[("OTP_MODE", "provider")]);
    let (status, body) = send(
        &app,
        json_request(Method::Post, "/auth/request", json!({"phone": "+15550100999"})),
    )
    .await;
    assert_eq!(status, StatusCode::InternalServerError);
    assert_eq!(body["error"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "An internal error occurred");
}

#[async_std::test]
async fn provider_wants_a_phone() {
    let app = app_with(&[("OTP_MODE", "provider")]);
    let (status, _) = send(
        &app,
        json_request(Method::Post, "/auth/request", json!({"phone": "voter@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
}

#[async_std::test]
async fn rate_limit_kicks_in() {
    let app = app_with(&[("RATE_LIMIT_MAX", "2")]);
    assert_eq!(send(&app, request(Method::Get, "/")).await.0, StatusCode::Ok);
    assert_eq!(send(&app, request(Method::Get, "/")).await.0, StatusCode::Ok);
    let (status, body) = send(&app, request(Method::Get, "/")).await;
    assert_eq!(status, StatusCode::TooManyRequests);
    assert_eq!(body["error"], "TOO_MANY_REQUESTS");
}

fn from_peer(path: &str, peer: &str) -> Request {
    let mut req = request(Method::Get, path);
    req.set_peer_addr(Some(peer));
    req
}

#[async_std::test]
async fn rate_limit_ignores_source_ports() {
    let app = app_with(&[("RATE_LIMIT_MAX", "1")]);
    assert_eq!(send(&app, from_peer("/", "10.0.0.1:40001")).await.0, StatusCode::Ok);
    assert_eq!(
        send(&app, from_peer("/", "10.0.0.1:40002")).await.0,
        StatusCode::TooManyRequests
    );
    assert_eq!(
        send(&app, from_peer("/", "10.0.0.1:40003")).await.0,
        StatusCode::TooManyRequests
    );
    assert_eq!(send(&app, from_peer("/", "10.0.0.2:40001")).await.0, StatusCode::Ok);
}

#[async_std::test]
async fn forged_forwarded_for_is_ignored() {
    let app = app_with(&[("RATE_LIMIT_MAX", "1")]);
    assert_eq!(send(&app, from_peer("/", "10.0.0.1:40001")).await.0, StatusCode::Ok);

    let mut req = from_peer("/", "10.0.0.1:40002");
    req.insert_header("X-Forwarded-For", "203.0.113.77");
    assert_eq!(send(&app, req).await.0, StatusCode::TooManyRequests);
}

#[async_std::test]
async fn forwarded_for_counts_when_trusted() {
    let app = app_with(&[("RATE_LIMIT_MAX", "1"), ("TRUST_FORWARDED_FOR", "true")]);
    let mut first = from_peer("/", "10.0.0.1:40001");
    first.insert_header("X-Forwarded-For", "203.0.113.1");
    assert_eq!(send(&app, first).await.0, StatusCode::Ok);

    let mut second = from_peer("/", "10.0.0.1:40002");
    second.insert_header("X-Forwarded-For", "203.0.113.2");
    assert_eq!(send(&app, second).await.0, StatusCode::Ok);

    let mut again = from_peer("/", "10.0.0.1:40003");
    again.insert_header("X-Forwarded-For", "203.0.113.1");
    assert_eq!(send(&app, again).await.0, StatusCode::TooManyRequests);
}

fn form_request(method: Method, path: &str, fields: &[(&str, &str)]) -> Request {
    let mut req = request(method, path);
    req.set_body(tide::Body::from_form(&fields).unwrap());
    req
}

#[async_std::test]
async fn provider_request_accepts_forms() {
    let app = app_with(&[("OTP_MODE", "provider")]);
    // parsed and validated, then refused for want of provider credentials
    let (status, body) = send(
        &app,
        form_request(Method::Post, "/auth/request", &[("phone", "+15550100999")]),
    )
    .await;
    assert_eq!(status, StatusCode::InternalServerError);
    assert_eq!(body["error"], "INTERNAL_ERROR");

    let (status, _) = send(
        &app,
        form_request(Method::Post, "/auth/request", &[("phone", "voter@example.com")]),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
}

#[async_std::test]
async fn provider_callback_accepts_forms() {
    let app = app_with(&[("OTP_MODE", "provider")]);
    let (status, _) = send(
        &app,
        form_request(
            Method::Post,
            "/auth/callback",
            &[("otp_id", "abc"), ("auth_status", "failed"), ("phone_sms", "+15550100999")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::Ok);
}

#[async_std::test]
async fn register_rejects_spaced_emails() {
    let (status, body) = send(
        &app(),
        json_request(Method::Post, "/auth/register", json!({"identifier": "vo ter@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["message"], "invalid email address");
}
