//! Integration tests for the Draw Server API
//!
//! These tests verify that the HTTP API endpoints work correctly
//! with a real database and authentication flow.

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use axum_test::TestServer;
use draw_server::create_test_app;
use serde_json::{json, Value};

/// Helper to create a test server instance
async fn setup() -> TestServer {
    let (app, _pool) = create_test_app().await;
    TestServer::new(app).unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

/// Helper to register a user and return (token, user_id)
async fn register_user(server: &TestServer, username: &str) -> (String, String) {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "Password123"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    (token, user_id)
}

/// Helper to create a tournament with the given roster and lobby size
async fn create_tournament(server: &TestServer, token: &str, id: &str, teams: &[&str], lobby_size: i64) {
    let response = server
        .post("/api/tournaments")
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({
            "id": id,
            "name": format!("{} Cup", id),
            "teams": teams,
            "lobby_size": lobby_size
        }))
        .await;

    response.assert_status_ok();
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = setup().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_root_endpoint() {
    let server = setup().await;

    let response = server.get("/").await;

    response.assert_status_ok();
    response.assert_text("Draw Server");
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_register_new_user() {
    let server = setup().await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": "testuser",
            "email": "test@example.com",
            "password": "Password123"
        }))
        .await;

    response.assert_status_ok();

    let body: Value = response.json();
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["username"], "testuser");
    assert_eq!(body["user"]["email"], "test@example.com");
}

#[tokio::test]
async fn test_register_duplicate_username() {
    let server = setup().await;

    register_user(&server, "testuser").await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": "testuser",
            "email": "other@example.com",
            "password": "Password123"
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_register_short_password() {
    let server = setup().await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": "testuser",
            "email": "test@example.com",
            "password": "short"
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_login_success() {
    let server = setup().await;

    register_user(&server, "testuser").await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({
            "username": "testuser",
            "password": "Password123"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_login_wrong_password() {
    let server = setup().await;

    register_user(&server, "testuser").await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({
            "username": "testuser",
            "password": "WrongPassword"
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tournaments_require_auth() {
    let server = setup().await;

    let response = server.get("/api/tournaments").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server.post("/api/tournaments/T1/join").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Tournament Creation Tests
// ============================================================================

#[tokio::test]
async fn test_create_and_get_tournament() {
    let server = setup().await;
    let (token, _) = register_user(&server, "admin").await;

    create_tournament(&server, &token, "T1", &["Ajax", "Arsenal"], 2).await;

    let response = server
        .get("/api/tournaments/T1")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tournament"]["id"], "T1");
    assert_eq!(body["tournament"]["status"], "active");
    assert_eq!(body["lobby_count"], 0);
    assert_eq!(body["joined_count"], 0);
    assert_eq!(body["is_joined"], false);
}

#[tokio::test]
async fn test_create_tournament_rejects_bad_input() {
    let server = setup().await;
    let (token, _) = register_user(&server, "admin").await;

    // Malformed id
    let response = server
        .post("/api/tournaments")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "id": "bad id!", "name": "Cup", "teams": ["A", "B"] }))
        .await;
    response.assert_status_bad_request();

    // Duplicate team names
    let response = server
        .post("/api/tournaments")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "id": "T1", "name": "Cup", "teams": ["Ajax", "Ajax"] }))
        .await;
    response.assert_status_bad_request();

    // Lobby size larger than the roster
    let response = server
        .post("/api/tournaments")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "id": "T1", "name": "Cup", "teams": ["A", "B"], "lobby_size": 3 }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_create_duplicate_tournament_id() {
    let server = setup().await;
    let (token, _) = register_user(&server, "admin").await;

    create_tournament(&server, &token, "T1", &["Ajax", "Arsenal"], 2).await;

    let response = server
        .post("/api/tournaments")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "id": "T1", "name": "Again", "teams": ["Ajax", "Arsenal"] }))
        .await;
    response.assert_status_bad_request();
}

// ============================================================================
// Join (Draw) Tests
// ============================================================================

#[tokio::test]
async fn test_join_unknown_tournament() {
    let server = setup().await;
    let (token, _) = register_user(&server, "userA").await;

    let response = server
        .post("/api/tournaments/nonexistent/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_first_join_assigns_team_and_creates_lobby() {
    let server = setup().await;
    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    let (token, _) = register_user(&server, "userA").await;
    let response = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let team = body["team"].as_str().unwrap();
    assert!(["Ajax", "Arsenal"].contains(&team));
    assert_eq!(body["lobby_id"], "T1_lobby_1");
    assert_eq!(body["lobby_status"], "open");
    assert!(body["assignment_id"].is_string());
}

#[tokio::test]
async fn test_duplicate_join_conflicts() {
    let server = setup().await;
    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    let (token, _) = register_user(&server, "userA").await;
    server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_lobby_fills_and_overflows_into_new_lobby() {
    let server = setup().await;
    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    let (token_a, _) = register_user(&server, "userA").await;
    let (token_b, _) = register_user(&server, "userB").await;
    let (token_c, _) = register_user(&server, "userC").await;

    let first: Value = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token_a))
        .await
        .json();

    let second_response = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token_b))
        .await;
    second_response.assert_status_ok();
    let second: Value = second_response.json();

    assert_eq!(second["lobby_id"], "T1_lobby_1");
    assert_eq!(second["lobby_status"], "full");
    assert_ne!(first["team"], second["team"]);

    // Third join lands in a fresh lobby, not rejected
    let third_response = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token_c))
        .await;
    third_response.assert_status_ok();
    let third: Value = third_response.json();
    assert_eq!(third["lobby_id"], "T1_lobby_2");
    assert_eq!(third["lobby_status"], "open");
}

#[tokio::test]
async fn test_closed_tournament_rejects_join() {
    let server = setup().await;
    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    server
        .post("/api/tournaments/T1/close")
        .add_header(AUTHORIZATION, bearer(&admin_token))
        .await
        .assert_status_ok();

    let (token, _) = register_user(&server, "userA").await;
    let response = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_join_rate_limit() {
    use draw_server::{allocator, api, auth, create_test_db, rate_limit};
    use std::sync::Arc;

    // Build the app by hand with a one-request bucket
    let pool = create_test_db().await;
    let jwt_manager = Arc::new(auth::JwtManager::new("test_secret_key".to_string()));
    let auth_state = Arc::new(api::AppState {
        pool: pool.clone(),
        jwt_manager: jwt_manager.clone(),
    });
    let tournament_state = Arc::new(api::TournamentAppState {
        pool: pool.clone(),
        jwt_manager,
        allocator: Arc::new(allocator::LobbyAllocator::new(pool.clone())),
        join_limiter: Arc::new(rate_limit::KeyedRateLimiter::new(0.0, 1.0)),
    });
    let server = TestServer::new(draw_server::create_app(auth_state, tournament_state)).unwrap();

    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    let (token, _) = register_user(&server, "userA").await;
    server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
}

// ============================================================================
// Lobby Visibility Tests
// ============================================================================

#[tokio::test]
async fn test_lobby_view_shows_own_lobby_only() {
    let server = setup().await;
    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    let (token_a, user_a) = register_user(&server, "userA").await;
    let (token_b, user_b) = register_user(&server, "userB").await;
    let (token_c, user_c) = register_user(&server, "userC").await;

    for token in [&token_a, &token_b, &token_c] {
        server
            .post("/api/tournaments/T1/join")
            .add_header(AUTHORIZATION, bearer(token))
            .await
            .assert_status_ok();
    }

    // userA and userB share the first lobby
    let response = server
        .get("/api/tournaments/T1/lobby")
        .add_header(AUTHORIZATION, bearer(&token_a))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["lobby_id"], "T1_lobby_1");
    assert_eq!(body["current_count"], 2);
    let members: Vec<&str> = body["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["user_id"].as_str().unwrap())
        .collect();
    assert!(members.contains(&user_a.as_str()));
    assert!(members.contains(&user_b.as_str()));
    assert!(!members.contains(&user_c.as_str()));

    // userC sees only the second lobby
    let response = server
        .get("/api/tournaments/T1/lobby")
        .add_header(AUTHORIZATION, bearer(&token_c))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["lobby_id"], "T1_lobby_2");
    assert_eq!(body["members"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_lobby_view_requires_assignment() {
    let server = setup().await;
    let (admin_token, _) = register_user(&server, "admin").await;
    create_tournament(&server, &admin_token, "T1", &["Ajax", "Arsenal"], 2).await;

    let (token, _) = register_user(&server, "outsider").await;
    let response = server
        .get("/api/tournaments/T1/lobby")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Listing Tests
// ============================================================================

#[tokio::test]
async fn test_list_tournaments_with_stats() {
    let server = setup().await;
    let (token, _) = register_user(&server, "admin").await;

    create_tournament(&server, &token, "T1", &["Ajax", "Arsenal"], 2).await;
    create_tournament(&server, &token, "T2", &["Porto", "Benfica"], 2).await;

    server
        .post("/api/tournaments/T1/join")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status_ok();

    let response = server
        .get("/api/tournaments")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let tournaments = body["tournaments"].as_array().unwrap();
    assert_eq!(tournaments.len(), 2);

    let t1 = tournaments
        .iter()
        .find(|t| t["tournament"]["id"] == "T1")
        .unwrap();
    assert_eq!(t1["joined_count"], 1);
    assert_eq!(t1["is_joined"], true);

    let t2 = tournaments
        .iter()
        .find(|t| t["tournament"]["id"] == "T2")
        .unwrap();
    assert_eq!(t2["joined_count"], 0);
    assert_eq!(t2["is_joined"], false);
}
