use crate::{
    allocator::{validate_id, LobbyAllocator, DEFAULT_ROSTER},
    audit,
    auth::AuthUser,
    db::models::{Lobby, Tournament},
    error::{AppError, Result},
    rate_limit::KeyedRateLimiter,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct CreateTournamentRequest {
    pub id: String,
    pub name: String,
    /// Team roster; empty means "use the built-in default roster"
    #[serde(default)]
    pub teams: Vec<String>,
    pub lobby_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TournamentListResponse {
    pub tournaments: Vec<TournamentWithStats>,
}

#[derive(Debug, Serialize)]
pub struct TournamentWithStats {
    pub tournament: Tournament,
    pub joined_count: i64,
    pub is_joined: bool,
}

#[derive(Debug, Serialize)]
pub struct TournamentDetailResponse {
    pub tournament: Tournament,
    pub lobby_count: i64,
    pub joined_count: i64,
    pub is_joined: bool,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub assignment_id: String,
    pub team: String,
    pub lobby_id: String,
    pub lobby_status: String,
}

#[derive(Debug, Serialize)]
pub struct LobbyViewResponse {
    pub lobby_id: String,
    pub status: String,
    pub capacity: i64,
    pub current_count: i64,
    pub members: Vec<LobbyMember>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LobbyMember {
    pub user_id: String,
    pub team: String,
}

// ==================== App State ====================

pub struct TournamentAppState {
    pub pool: crate::db::DbPool,
    pub jwt_manager: Arc<crate::auth::JwtManager>,
    pub allocator: Arc<LobbyAllocator>,
    pub join_limiter: Arc<KeyedRateLimiter>,
}

// ==================== Router ====================

pub fn router() -> Router<Arc<TournamentAppState>> {
    Router::new()
        .route("/", post(create_tournament).get(list_tournaments))
        .route("/:id", get(get_tournament))
        .route("/:id/close", post(close_tournament))
        .route("/:id/join", post(join_tournament))
        .route("/:id/lobby", get(get_my_lobby))
}

// ==================== Handlers ====================

async fn create_tournament(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTournamentRequest>,
) -> Result<Json<Tournament>> {
    let auth_user = authenticate(&state, &headers)?;

    validate_id(&req.id, "tournament id")?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation(
            "Tournament name is required".to_string(),
        ));
    }

    let teams: Vec<String> = req.teams.iter().map(|t| t.trim().to_string()).collect();
    if teams.iter().any(|t| t.is_empty()) {
        return Err(AppError::Validation(
            "Team names must not be empty".to_string(),
        ));
    }
    let mut deduped = teams.clone();
    deduped.sort();
    deduped.dedup();
    if deduped.len() != teams.len() {
        return Err(AppError::Validation(
            "Team names must be unique".to_string(),
        ));
    }

    // The roster is fixed for the tournament's lifetime, so a lobby can
    // never need more teams than the roster holds.
    let roster_len = if teams.is_empty() {
        DEFAULT_ROSTER.len() as i64
    } else {
        teams.len() as i64
    };
    let lobby_size = req.lobby_size.unwrap_or(0);
    if let Some(n) = req.lobby_size {
        if n < 1 || n > roster_len {
            return Err(AppError::Validation(format!(
                "Lobby size must be between 1 and {} (the roster size)",
                roster_len
            )));
        }
    }

    let tournament = Tournament::new(req.id, req.name, &teams, lobby_size);

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO tournaments (id, name, roster, lobby_size, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&tournament.id)
    .bind(&tournament.name)
    .bind(&tournament.roster)
    .bind(tournament.lobby_size)
    .bind(&tournament.status)
    .bind(&tournament.created_at)
    .execute(&state.pool)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "Tournament id already exists".to_string(),
        ));
    }

    audit::log_tournament_event(
        &tournament.id,
        "created",
        &format!("by {} ({} teams)", auth_user.user_id, roster_len),
    );

    Ok(Json(tournament))
}

async fn list_tournaments(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
) -> Result<Json<TournamentListResponse>> {
    let auth_user = authenticate(&state, &headers)?;

    let tournaments: Vec<Tournament> =
        sqlx::query_as("SELECT * FROM tournaments ORDER BY created_at DESC LIMIT 50")
            .fetch_all(&state.pool)
            .await?;

    let mut results = Vec::new();
    for tournament in tournaments {
        let (joined_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assignments WHERE tournament_id = ? AND status = 'active'",
        )
        .bind(&tournament.id)
        .fetch_one(&state.pool)
        .await?;

        let is_joined: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM assignments
             WHERE tournament_id = ? AND user_id = ? AND status = 'active'",
        )
        .bind(&tournament.id)
        .bind(&auth_user.user_id)
        .fetch_optional(&state.pool)
        .await?;

        results.push(TournamentWithStats {
            tournament,
            joined_count,
            is_joined: is_joined.is_some(),
        });
    }

    Ok(Json(TournamentListResponse {
        tournaments: results,
    }))
}

async fn get_tournament(
    State(state): State<Arc<TournamentAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TournamentDetailResponse>> {
    let auth_user = authenticate(&state, &headers)?;

    let tournament: Tournament = sqlx::query_as("SELECT * FROM tournaments WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Tournament not found".to_string()))?;

    let (lobby_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM lobbies WHERE tournament_id = ?")
            .bind(&id)
            .fetch_one(&state.pool)
            .await?;

    let (joined_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM assignments WHERE tournament_id = ? AND status = 'active'",
    )
    .bind(&id)
    .fetch_one(&state.pool)
    .await?;

    let is_joined: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM assignments
         WHERE tournament_id = ? AND user_id = ? AND status = 'active'",
    )
    .bind(&id)
    .bind(&auth_user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    Ok(Json(TournamentDetailResponse {
        tournament,
        lobby_count,
        joined_count,
        is_joined: is_joined.is_some(),
    }))
}

async fn close_tournament(
    State(state): State<Arc<TournamentAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Tournament>> {
    let auth_user = authenticate(&state, &headers)?;

    let updated = sqlx::query("UPDATE tournaments SET status = 'closed' WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Tournament not found".to_string()));
    }

    let tournament: Tournament = sqlx::query_as("SELECT * FROM tournaments WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.pool)
        .await?;

    audit::log_tournament_event(&id, "closed", &format!("by {}", auth_user.user_id));

    Ok(Json(tournament))
}

async fn join_tournament(
    State(state): State<Arc<TournamentAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JoinResponse>> {
    // user_id always comes from the verified token, never the request body
    let auth_user = authenticate(&state, &headers)?;

    if !state.join_limiter.allow(&auth_user.user_id) {
        audit::log_security_event(&auth_user.user_id, "rate_limited", "join");
        return Err(AppError::RateLimited);
    }

    let outcome = match state.allocator.join(&id, &auth_user.user_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::log_join_rejected(&id, &auth_user.user_id, &err.to_string());
            return Err(err);
        }
    };

    audit::log_join(
        &id,
        &auth_user.user_id,
        &outcome.assignment.lobby_id,
        &outcome.assignment.team,
    );

    Ok(Json(JoinResponse {
        assignment_id: outcome.assignment.id,
        team: outcome.assignment.team,
        lobby_id: outcome.assignment.lobby_id,
        lobby_status: outcome.lobby_status,
    }))
}

/// The caller sees their own lobby only, never the assignment state of
/// other lobbies in the tournament.
async fn get_my_lobby(
    State(state): State<Arc<TournamentAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LobbyViewResponse>> {
    let auth_user = authenticate(&state, &headers)?;

    let lobby_id: Option<(String,)> = sqlx::query_as(
        "SELECT lobby_id FROM assignments
         WHERE tournament_id = ? AND user_id = ? AND status = 'active'",
    )
    .bind(&id)
    .bind(&auth_user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let (lobby_id,) =
        lobby_id.ok_or_else(|| AppError::NotFound("You have not joined this tournament".to_string()))?;

    let lobby: Lobby = sqlx::query_as("SELECT * FROM lobbies WHERE id = ?")
        .bind(&lobby_id)
        .fetch_one(&state.pool)
        .await?;

    let members: Vec<LobbyMember> = sqlx::query_as(
        "SELECT user_id, team FROM assignments
         WHERE lobby_id = ? AND status = 'active'
         ORDER BY created_at",
    )
    .bind(&lobby_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(LobbyViewResponse {
        lobby_id: lobby.id,
        status: lobby.status,
        capacity: lobby.capacity,
        current_count: lobby.current_count,
        members,
    }))
}

// ==================== Helper Functions ====================

fn authenticate(state: &TournamentAppState, headers: &HeaderMap) -> Result<AuthUser> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    AuthUser::from_header(&state.jwt_manager, auth_header)
}
