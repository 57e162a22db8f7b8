//! Router-level tests for register, login, logout and me, backed by the
//! in-memory user directory.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use quill::auth::jwt::JwtKeys;
use quill::auth::memory::MemoryUserDirectory;
use quill::auth::repo::{DirectoryError, DirectoryResult, UserDirectory};
use quill::auth::repo_types::User;
use quill::{build_app, AppConfig, AppState};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-jwt-secret";

fn app_with(directory: Arc<dyn UserDirectory>) -> Router {
    let state = AppState::from_parts(directory, AppConfig::for_tests(SECRET)).expect("state");
    build_app(state)
}

fn app() -> (Router, Arc<MemoryUserDirectory>) {
    let directory = Arc::new(MemoryUserDirectory::new());
    (app_with(directory.clone()), directory)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, headers, json)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn register(app: &Router, username: &str, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, json) = send(
        app,
        post_json(
            "/api/auth/register",
            json!({ "username": username, "email": email, "password": password }),
        ),
    )
    .await;
    (status, json)
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
    send(
        app,
        post_json("/api/auth/login", json!({ "email": email, "password": password })),
    )
    .await
}

fn set_cookie(headers: &HeaderMap) -> String {
    headers
        .get(header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = app();
    let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let (status, _, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn register_returns_public_user() {
    let (app, directory) = app();
    let (status, json) = register(&app, "Alice", "Alice@Example.com", "correct-horse").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "User registered successfully");
    assert_eq!(json["user"]["username"], "alice");
    assert_eq!(json["user"]["email"], "alice@example.com");
    assert!(json["user"]["id"].as_str().is_some());
    assert!(json.get("token").is_none());

    let text = json.to_string();
    assert!(!text.contains("password"));
    assert!(!text.contains("correct-horse"));
    assert!(!text.contains("argon2"));
    assert_eq!(directory.len().await, 1);
}

#[tokio::test]
async fn register_reports_all_violations() {
    let (app, directory) = app();
    let (status, json) = register(&app, "ab", "ab@example.com", "short").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Validation error");
    assert_eq!(
        json["errors"],
        json!([
            "Username must be at least 3 characters long",
            "Password must be at least 8 characters long"
        ])
    );
    assert!(directory.is_empty().await);
}

#[tokio::test]
async fn register_with_empty_body_lists_required_fields() {
    let (app, _) = app();
    let (status, _, json) = send(&app, post_json("/api/auth/register", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errors"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn mistyped_fields_are_reported_with_other_violations() {
    let (app, directory) = app();
    let (status, _, json) = send(
        &app,
        post_json(
            "/api/auth/register",
            json!({ "username": 123, "email": "bad", "password": "short" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Validation error");
    assert_eq!(
        json["errors"],
        json!([
            "Username must be a string",
            "Invalid email format",
            "Password must be at least 8 characters long"
        ])
    );
    assert!(directory.is_empty().await);
}

#[tokio::test]
async fn email_with_empty_domain_label_is_rejected() {
    let (app, directory) = app();
    let (status, json) = register(&app, "alice", "alice@b..com", "correct-horse").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errors"], json!(["Invalid email format"]));
    assert!(directory.is_empty().await);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let (app, _) = app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Validation error");
}

#[tokio::test]
async fn duplicate_email_is_case_insensitive() {
    let (app, _) = app();
    let (status, _) = register(&app, "first", "USER@x.com", "password-one").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = register(&app, "second", "user@x.com", "password-two").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Email is already registered");
}

#[tokio::test]
async fn duplicate_username_is_reported() {
    let (app, _) = app();
    register(&app, "alice", "alice@example.com", "password-one").await;

    let (status, json) = register(&app, "ALICE", "other@example.com", "password-two").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Username is already taken");
}

#[tokio::test]
async fn email_collision_wins_over_username() {
    let (app, _) = app();
    register(&app, "alice", "alice@example.com", "password-one").await;

    let (_, json) = register(&app, "alice", "alice@example.com", "password-two").await;
    assert_eq!(json["message"], "Email is already registered");
}

#[tokio::test]
async fn login_unknown_email_is_not_found() {
    let (app, _) = app();
    let (status, headers, json) = login(&app, "ghost@example.com", "whatever-pass").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "User not found");
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn login_wrong_password_is_unauthorized() {
    let (app, _) = app();
    register(&app, "alice", "alice@example.com", "correct-horse").await;

    let (status, headers, json) = login(&app, "alice@example.com", "wrong-horse").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid email or password");
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn login_validation_error() {
    let (app, _) = app();
    let (status, _, json) = login(&app, "not-an-email", "short").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["errors"],
        json!(["Invalid email format", "Password must be at least 8 characters long"])
    );
}

#[tokio::test]
async fn login_issues_token_and_cookie() {
    let (app, _) = app();
    let (_, registered) = register(&app, "alice", "alice@example.com", "correct-horse").await;
    let user_id: Uuid = registered["user"]["id"].as_str().unwrap().parse().unwrap();

    let (status, headers, json) = login(&app, "ALICE@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Login successful");
    assert_eq!(json["user"]["username"], "alice");
    assert!(!json.to_string().contains("correct-horse"));

    let token = json["token"].as_str().unwrap();
    let keys = JwtKeys::new(&AppConfig::for_tests(SECRET).jwt);
    let claims = keys.verify(token).expect("token verifies");
    assert_eq!(claims.id, user_id);
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);

    let cookie = set_cookie(&headers);
    assert!(cookie.starts_with(&format!("token={token}")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn logout_clears_cookie_without_session() {
    let (app, _) = app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .body(Body::empty())
        .unwrap();
    let (status, headers, json) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Logout successful");
    let cookie = set_cookie(&headers);
    assert!(cookie.starts_with("token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn me_uses_session_cookie() {
    let (app, _) = app();
    register(&app, "alice", "alice@example.com", "correct-horse").await;
    let (_, headers, _) = login(&app, "alice@example.com", "correct-horse").await;
    let cookie = set_cookie(&headers);
    let pair = cookie.split(';').next().unwrap().to_string();

    let req = Request::builder()
        .uri("/api/auth/me")
        .header(header::COOKIE, pair)
        .body(Body::empty())
        .unwrap();
    let (status, _, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn me_accepts_bearer_and_rejects_garbage() {
    let (app, _) = app();
    register(&app, "alice", "alice@example.com", "correct-horse").await;
    let (_, _, json) = login(&app, "alice@example.com", "correct-horse").await;
    let token = json["token"].as_str().unwrap().to_string();

    let req = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

struct BrokenDirectory;

#[async_trait]
impl UserDirectory for BrokenDirectory {
    async fn find_by_email_or_username(&self, _: &str, _: &str) -> DirectoryResult<Option<User>> {
        Err(DirectoryError::Storage(anyhow::anyhow!("db password=s3cret unreachable")))
    }
    async fn find_by_email(&self, _: &str) -> DirectoryResult<Option<User>> {
        Err(DirectoryError::Storage(anyhow::anyhow!("db password=s3cret unreachable")))
    }
    async fn find_by_id(&self, _: Uuid) -> DirectoryResult<Option<User>> {
        Err(DirectoryError::Storage(anyhow::anyhow!("db password=s3cret unreachable")))
    }
    async fn create(&self, _: &str, _: &str, _: &str) -> DirectoryResult<User> {
        Err(DirectoryError::Storage(anyhow::anyhow!("db password=s3cret unreachable")))
    }
}

#[tokio::test]
async fn storage_failure_is_internal_without_details() {
    let app = app_with(Arc::new(BrokenDirectory));

    let (status, json) = register(&app, "alice", "alice@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Internal server error");
    assert!(!json.to_string().contains("s3cret"));

    let (status, _, json) = login(&app, "alice@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["message"], "Internal server error");
}

/// Passes the pre-insert check, then loses the insert race.
struct RacingDirectory(MemoryUserDirectory);

#[async_trait]
impl UserDirectory for RacingDirectory {
    async fn find_by_email_or_username(&self, _: &str, _: &str) -> DirectoryResult<Option<User>> {
        Ok(None)
    }
    async fn find_by_email(&self, email: &str) -> DirectoryResult<Option<User>> {
        self.0.find_by_email(email).await
    }
    async fn find_by_id(&self, id: Uuid) -> DirectoryResult<Option<User>> {
        self.0.find_by_id(id).await
    }
    async fn create(&self, username: &str, email: &str, hash: &str) -> DirectoryResult<User> {
        self.0.create(username, email, hash).await
    }
}

#[tokio::test]
async fn insert_race_is_reported_as_duplicate() {
    let app = app_with(Arc::new(RacingDirectory(MemoryUserDirectory::new())));
    register(&app, "alice", "alice@example.com", "correct-horse").await;

    let (status, json) = register(&app, "bob", "alice@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Email is already registered");
}
