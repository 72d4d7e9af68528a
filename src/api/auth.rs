use crate::{
    audit,
    auth::JwtManager,
    db::{models::User, DbPool},
    error::{AppError, Result},
};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

pub struct AppState {
    pub pool: DbPool,
    pub jwt_manager: Arc<JwtManager>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    if let Err(msg) = validate_password(&req.password) {
        return Err(AppError::Validation(msg));
    }

    // Case-insensitive duplicate check
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM users WHERE LOWER(username) = LOWER(?) OR LOWER(email) = LOWER(?)",
    )
    .bind(&req.username)
    .bind(&req.email)
    .fetch_optional(&state.pool)
    .await?;

    if existing.is_some() {
        return Err(AppError::Validation(
            "Username or email already exists".to_string(),
        ));
    }

    let password_hash = bcrypt::hash(req.password.as_bytes(), bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))?;

    let user = User::new(req.username, req.email, password_hash);

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.created_at)
    .execute(&state.pool)
    .await?;

    let token = state
        .jwt_manager
        .create_token(user.id.clone(), user.username.clone())?;

    audit::log_auth_event(&user.username, "register", true);

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(&req.username)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| {
            audit::log_auth_event(&req.username, "login", false);
            AppError::Auth("Invalid username or password".to_string())
        })?;

    let valid = bcrypt::verify(req.password.as_bytes(), &user.password_hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to verify password: {}", e)))?;

    if !valid {
        audit::log_auth_event(&req.username, "login", false);
        return Err(AppError::Auth("Invalid username or password".to_string()));
    }

    let token = state
        .jwt_manager
        .create_token(user.id.clone(), user.username.clone())?;

    audit::log_auth_event(&user.username, "login", true);

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

fn validate_password(password: &str) -> std::result::Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    Ok(())
}
