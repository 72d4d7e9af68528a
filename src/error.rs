//! Application error taxonomy.
//!
//! Every failure path surfaces a distinguishable variant so handlers can
//! return an accurate status and clients can render an accurate message
//! ("you already have a team" vs "please try again").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Malformed caller input (bad id charset, empty fields, ...)
    Validation(String),
    /// Request is well-formed but violates a business rule
    BadRequest(String),
    /// Missing or invalid Authorization header
    Unauthorized,
    /// Token creation/verification failure
    Auth(String),
    Forbidden,
    NotFound(String),
    /// Duplicate join: the user already holds a team in this tournament
    AlreadyAssigned,
    /// Transient exhaustion: no team/lobby slot after bounded retries
    Unavailable(String),
    /// Tournament data is unusable (capacity larger than roster, ...)
    InvalidConfiguration(String),
    RateLimited,
    Database(sqlx::Error),
    Internal(anyhow::Error),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "{}", msg),
            AppError::Unauthorized => write!(f, "Unauthorized"),
            AppError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            AppError::Forbidden => write!(f, "Forbidden"),
            AppError::NotFound(msg) => write!(f, "{}", msg),
            AppError::AlreadyAssigned => write!(f, "You already have a team in this tournament"),
            AppError::Unavailable(msg) => write!(f, "{}", msg),
            AppError::InvalidConfiguration(msg) => {
                write!(f, "Tournament is misconfigured: {}", msg)
            }
            AppError::RateLimited => write!(f, "Too many requests, slow down"),
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Internal(err) => write!(f, "Internal error: {}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Unauthorized | AppError::Auth(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::AlreadyAssigned => (StatusCode::CONFLICT, self.to_string()),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::InvalidConfiguration(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
