//! Draw Server Library
//!
//! This module exposes the server components for integration testing.

pub mod allocator;
pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod rate_limit;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Creates the application router with all endpoints
pub fn create_app(
    auth_state: Arc<api::AppState>,
    tournament_state: Arc<api::TournamentAppState>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Draw Server" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api/auth", api::auth_router().with_state(auth_state))
        .nest(
            "/api/tournaments",
            api::tournaments_router().with_state(tournament_state),
        )
        .layer(cors)
}

/// Test helper to create an in-memory database and run migrations
pub async fn create_test_db() -> db::DbPool {
    // A single connection keeps the in-memory database shared across all
    // queries issued through the pool.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Test helper to create a file-backed database with a multi-connection
/// pool, for tests that need genuinely concurrent transactions (the
/// single-connection in-memory pool serializes them).
pub async fn create_contended_test_db() -> db::DbPool {
    let path = std::env::temp_dir().join(format!("draw-test-{}.db", uuid::Uuid::new_v4()));
    let database_url = format!("sqlite:{}", path.display());

    let pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create file-backed test database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Test helper to create a fully configured test app
pub async fn create_test_app() -> (Router, db::DbPool) {
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
        // Generous limits so ordinary tests never trip the limiter
        join_limiter: Arc::new(rate_limit::KeyedRateLimiter::new(100.0, 100.0)),
    });

    let app = create_app(auth_state, tournament_state);
    (app, pool)
}
