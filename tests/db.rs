use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::time::Duration;
use tide::http::{Method, Request, Response, StatusCode, Url};
use tide::Server;
use uuid::Uuid;

use otpvote::config::Config;
use otpvote::models::User;
use otpvote::{build_app, dao, AppState};

/**
 * A migrated database from TEST_DATABASE_URL (or DATABASE_URL), None when neither is set
 */
async fn live_app() -> Option<Server<AppState>> {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;

    let mut env = HashMap::new();
    env.insert("DATABASE_URL".to_string(), url);
    env.insert("JWT_SECRET".to_string(), "db-secret".to_string());
    env.insert("REDIS_URL".to_string(), "redis://127.0.0.1:1/".to_string());
    let config = Config::from_lookup(|key| env.get(key).cloned()).expect("config");

    let db = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("database");
    dao::migrate(&db).await.expect("migrations");

    let redis = redis::Client::open(config.redis_url.as_str()).expect("redis url");
    Some(build_app(AppState::new(config, db, redis)).expect("app"))
}

async fn voter(app: &Server<AppState>) -> (User, String) {
    let email = format!("{}@example.com", Uuid::new_v4());
    let user = dao::upsert_user(&app.state().db, &email).await.expect("user");
    let token = app.state().tokens.issue(user.id, &email).expect("token");
    (user, format!("Bearer {}", token))
}

fn request(method: Method, path: &str, auth: &str) -> Request {
    let mut req = Request::new(method, Url::parse(&format!("http://localhost{}", path)).unwrap());
    req.insert_header("Authorization", auth);
    req
}

fn json_request(method: Method, path: &str, auth: &str, body: Value) -> Request {
    let mut req = request(method, path, auth);
    req.set_body(tide::Body::from_json(&body).unwrap());
    req
}

async fn send(app: &Server<AppState>, req: Request) -> (StatusCode, Value) {
    let mut res: Response = app.respond(req).await.expect("response");
    let status = res.status();
    let body = res.body_string().await.unwrap_or_default();
    (status, serde_json::from_str(&body).unwrap_or(Value::Null))
}

async fn create_poll(app: &Server<AppState>, auth: &str, title: &str, options: &[&str]) -> Value {
    let (status, body) = send(
        app,
        json_request(Method::Post, "/polls", auth, json!({"title": title, "options": options})),
    )
    .await;
    assert_eq!(status, StatusCode::Created, "{}", body);
    body
}

async fn option_ids(app: &Server<AppState>, auth: &str, poll_id: &str) -> Vec<(String, String)> {
    let (status, body) = send(app, request(Method::Get, &format!("/polls/{}", poll_id), auth)).await;
    assert_eq!(status, StatusCode::Ok);
    body["options"]
        .as_array()
        .expect("options")
        .iter()
        .map(|o| {
            (
                o["id"].as_str().unwrap().to_string(),
                o["text"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[async_std::test]
async fn listing_is_newest_first() {
    let app = match live_app().await {
        Some(app) => app,
        None => return,
    };
    let (_, auth) = voter(&app).await;

    let older = create_poll(&app, &auth, "Breakfast?", &["Eggs", "Toast"]).await;
    async_std::task::sleep(Duration::from_millis(20)).await;
    let newer = create_poll(&app, &auth, "Dinner?", &["Soup", "Salad"]).await;

    let (status, body) = send(&app, request(Method::Get, "/polls", &auth)).await;
    assert_eq!(status, StatusCode::Ok);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![newer["poll_id"].as_str().unwrap(), older["poll_id"].as_str().unwrap()]
    );
}

#[async_std::test]
async fn voting_end_to_end() {
    let app = match live_app().await {
        Some(app) => app,
        None => return,
    };
    let (creator, creator_auth) = voter(&app).await;
    let (_, ballot_auth) = voter(&app).await;

    let lunch = create_poll(&app, &creator_auth, "Lunch?", &["Tacos", "Pizza", "Ramen"]).await;
    let lunch_id = lunch["poll_id"].as_str().unwrap().to_string();
    assert_eq!(lunch["created_by"], creator.id.to_string());

    let options = option_ids(&app, &creator_auth, &lunch_id).await;
    let texts: Vec<&str> = options.iter().map(|(_, text)| text.as_str()).collect();
    assert_eq!(texts, vec!["Tacos", "Pizza", "Ramen"]);
    let pizza = options[1].0.clone();

    let other = create_poll(&app, &creator_auth, "Drinks?", &["Tea", "Coffee"]).await;
    let other_id = other["poll_id"].as_str().unwrap().to_string();
    let tea = option_ids(&app, &creator_auth, &other_id).await[0].0.clone();

    let vote_path = format!("/polls/{}/vote", lunch_id);
    let (status, body) = send(
        &app,
        json_request(Method::Post, &vote_path, &ballot_auth, json!({"option_id": pizza})),
    )
    .await;
    assert_eq!(status, StatusCode::Ok, "{}", body);
    assert_eq!(body["option_id"], pizza);

    let (status, body) = send(
        &app,
        json_request(Method::Post, &vote_path, &ballot_auth, json!({"option_id": pizza})),
    )
    .await;
    assert_eq!(status, StatusCode::Conflict);
    assert_eq!(body["error"], "CONFLICT");

    let (status, body) = send(
        &app,
        json_request(Method::Post, &vote_path, &creator_auth, json!({"option_id": tea})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["message"], "Option does not belong to poll");

    let (status, _) = send(
        &app,
        json_request(
            Method::Post,
            &format!("/polls/{}/vote", Uuid::new_v4()),
            &creator_auth,
            json!({"option_id": pizza}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NotFound);

    let voters_path = format!("/polls/{}/votes", lunch_id);
    let (status, _) = send(&app, request(Method::Get, &voters_path, &ballot_auth)).await;
    assert_eq!(status, StatusCode::Forbidden);
    let (status, body) = send(&app, request(Method::Get, &voters_path, &creator_auth)).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["option_text"], "Pizza");

    let (status, body) = send(
        &app,
        request(Method::Get, &format!("/polls/{}/results", lunch_id), &ballot_auth),
    )
    .await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["total_votes"], 1);
    let tally: Vec<(&str, i64)> = body["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| (o["option_text"].as_str().unwrap(), o["votes"].as_i64().unwrap()))
        .collect();
    assert_eq!(tally, vec![("Tacos", 0), ("Pizza", 1), ("Ramen", 0)]);
}
