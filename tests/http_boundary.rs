use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use kisschat::{
    app,
    auth::TokenVerifier,
    db::{connect_in_memory, MessageKind},
    rooms::{msg, store, EmptyRoomPolicy},
    AppState,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, SessionManagerLayer};

const SECRET: &str = "shared-with-upstream";
const ISSUER: &str = "kisschat-auth";

async fn server() -> (Router, SqlitePool) {
    let db_pool = connect_in_memory().await.unwrap();
    let state = AppState::new(db_pool.clone(), EmptyRoomPolicy::Keep, TokenVerifier::new(SECRET, ISSUER));
    let router = app(state).layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false));
    (router, db_pool)
}

fn token_for(user_id: &str) -> String {
    TokenVerifier::new(SECRET, ISSUER)
        .issue(user_id, chrono::Duration::minutes(5))
        .unwrap()
}

async fn lockin(router: &Router, bearer: Option<&str>) -> (StatusCode, Option<String>) {
    let mut req = Request::builder().method("POST").uri("/session");
    if let Some(bearer) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
    }
    let res = router.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_owned);
    (res.status(), cookie)
}

async fn signed_in(router: &Router, user_id: &str) -> String {
    let (status, cookie) = lockin(router, Some(&token_for(user_id))).await;
    assert_eq!(status, StatusCode::OK);
    cookie.unwrap()
}

async fn call(router: &Router, method: &str, uri: &str, cookie: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie);
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    };
    let res = router.clone().oneshot(req.unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn session_bind_needs_a_signed_token() {
    let (router, _) = server().await;

    assert_eq!(lockin(&router, None).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(lockin(&router, Some("forged")).await.0, StatusCode::UNAUTHORIZED);

    let foreign = TokenVerifier::new("guessed", ISSUER)
        .issue("victim", chrono::Duration::minutes(5))
        .unwrap();
    assert_eq!(lockin(&router, Some(&foreign)).await.0, StatusCode::UNAUTHORIZED);

    let (status, cookie) = lockin(&router, Some(&token_for("u1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_some());
}

#[tokio::test]
async fn unbound_session_cannot_edit_anothers_message() {
    let (router, db_pool) = server().await;
    let room = store::get_or_create_private_room(&db_pool, "victim", "u2").await.unwrap();
    let sent = msg::post_message(&db_pool, room.id, "victim", MessageKind::Text, Some("original".into()))
        .await
        .unwrap();

    let (status, cookie) = lockin(&router, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let cookie = cookie.unwrap_or_default();
    let (status, _) = call(&router, "PATCH", &format!("/m/{}", sent.id), &cookie, Some(serde_json::json!({"content": "forged"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mallory = signed_in(&router, "mallory").await;
    let (status, body) = call(&router, "PATCH", &format!("/m/{}", sent.id), &mallory, Some(serde_json::json!({"content": "forged"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let stored = msg::find_message(&db_pool, sent.id).await.unwrap();
    assert_eq!(stored.content.as_deref(), Some("original"));
    assert!(!stored.edited);
}

#[tokio::test]
async fn read_state_of_private_rooms_stays_private() {
    let (router, db_pool) = server().await;
    let room = store::get_or_create_private_room(&db_pool, "u1", "u2").await.unwrap();
    msg::post_message(&db_pool, room.id, "u1", MessageKind::Text, Some("secret".into()))
        .await
        .unwrap();

    let stranger = signed_in(&router, "u3").await;
    let (status, _) = call(&router, "GET", &format!("/r/{}/unread", room.id), &stranger, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&router, "POST", &format!("/r/{}/read", room.id), &stranger, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (receipts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM message_reads")
        .fetch_one(&db_pool)
        .await
        .unwrap();
    assert_eq!(receipts, 0);

    let member = signed_in(&router, "u2").await;
    let (status, body) = call(&router, "GET", &format!("/r/{}/unread", room.id), &member, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unread_count"], 1);
    let (status, body) = call(&router, "POST", &format!("/r/{}/read", room.id), &member, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 1);
}

#[tokio::test]
async fn read_state_of_missing_room_is_not_found() {
    let (router, _) = server().await;
    let member = signed_in(&router, "u1").await;
    let (status, body) = call(&router, "GET", &format!("/r/{}/unread", uuid::Uuid::now_v7()), &member, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}
