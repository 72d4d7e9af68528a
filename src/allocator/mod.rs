//! Lobby allocation: the one subsystem with real invariants.
//!
//! `join` atomically finds-or-creates an open lobby for the tournament,
//! picks an unused team in that lobby at random, and records the
//! assignment. Under concurrent joins the invariants (no duplicate team
//! per lobby, no lobby over capacity, one assignment per user per
//! tournament) are upheld by running each attempt as a single transaction
//! whose lobby update is guarded by a version compare-and-swap; a lost
//! race shows up as a conflict and the whole attempt is re-run from a
//! fresh snapshot. Unique indexes on assignments back the same invariants
//! at the storage layer.

use crate::db::models::{Assignment, Lobby, Tournament};
use crate::db::DbPool;
use crate::error::{AppError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::error::ErrorKind;
use std::time::Duration;

/// Fallback roster for tournaments created without one.
pub const DEFAULT_ROSTER: &[&str] = &[
    "Ajax",
    "Arsenal",
    "Atletico Madrid",
    "Barcelona",
    "Bayern Munich",
    "Benfica",
    "Borussia Dortmund",
    "Chelsea",
    "Inter",
    "Juventus",
    "Liverpool",
    "Manchester City",
    "Milan",
    "Paris Saint-Germain",
    "Porto",
    "Real Madrid",
];

/// Bounded retry budget for conflicting concurrent joins. Exhaustion is
/// surfaced as `Unavailable` rather than looping under hot contention.
const MAX_ATTEMPTS: u32 = 8;

/// Backoff between attempts: the loser of a race must wait out the
/// winner's in-flight commit instead of burning its attempts
/// back-to-back. Jitter spreads out racers that lost the same round.
const RETRY_BASE_DELAY_MS: u64 = 5;
const RETRY_JITTER_MS: u64 = 5;

const MAX_ID_LEN: usize = 64;

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub assignment: Assignment,
    pub lobby_status: String,
}

/// Outcome of a single transactional attempt. Conflicts are retried by
/// the outer loop; fatal errors go straight to the caller.
enum Attempt {
    Conflict,
    Fatal(AppError),
}

impl From<AppError> for Attempt {
    fn from(err: AppError) -> Self {
        Attempt::Fatal(err)
    }
}

pub struct LobbyAllocator {
    pool: DbPool,
}

impl LobbyAllocator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Join a tournament: durably assign the user a random unused team in
    /// an open lobby, creating the lobby if none has spare capacity.
    pub async fn join(&self, tournament_id: &str, user_id: &str) -> Result<JoinOutcome> {
        validate_id(tournament_id, "tournament id")?;
        validate_id(user_id, "user id")?;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_join(tournament_id, user_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Conflict) => {
                    tracing::debug!(
                        tournament_id = tournament_id,
                        user_id = user_id,
                        attempt = attempt,
                        "Join conflict, retrying"
                    );
                    if attempt < MAX_ATTEMPTS {
                        let jitter = { rand::thread_rng().gen_range(0..=RETRY_JITTER_MS) };
                        let delay = RETRY_BASE_DELAY_MS * u64::from(attempt) + jitter;
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        Err(AppError::Unavailable(
            "Tournament is busy, please try again".to_string(),
        ))
    }

    /// One transactional attempt. All reads and writes share the
    /// transaction; nothing is visible unless the commit succeeds.
    async fn try_join(&self, tournament_id: &str, user_id: &str) -> Result<JoinOutcome, Attempt> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let tournament: Tournament = sqlx::query_as("SELECT * FROM tournaments WHERE id = ?")
            .bind(tournament_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AppError::NotFound("Tournament not found".to_string()))?;

        if tournament.status != "active" {
            return Err(AppError::BadRequest(
                "Tournament is not accepting joins".to_string(),
            )
            .into());
        }

        let mut roster = tournament.teams();
        if roster.is_empty() {
            roster = DEFAULT_ROSTER.iter().map(|s| s.to_string()).collect();
        }

        let capacity = if tournament.lobby_size > 0 {
            tournament.lobby_size
        } else {
            roster.len() as i64
        };
        if capacity <= 0 || capacity > roster.len() as i64 {
            return Err(AppError::InvalidConfiguration(format!(
                "lobby size {} exceeds roster of {} teams",
                capacity,
                roster.len()
            ))
            .into());
        }

        // Idempotency guard: a retrying user gets a deterministic
        // rejection, never a second team.
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM assignments
             WHERE tournament_id = ? AND user_id = ? AND status = 'active'",
        )
        .bind(tournament_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        if existing.is_some() {
            return Err(AppError::AlreadyAssigned.into());
        }

        // Any open lobby is acceptable; take the oldest. Create one lazily
        // only when none is open.
        let open_lobby: Option<Lobby> = sqlx::query_as(
            "SELECT * FROM lobbies
             WHERE tournament_id = ? AND status = 'open'
             ORDER BY created_at, id
             LIMIT 1",
        )
        .bind(tournament_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let lobby = match open_lobby {
            Some(lobby) => lobby,
            None => {
                let (count,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM lobbies WHERE tournament_id = ?")
                        .bind(tournament_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(store_error)?;

                let lobby = Lobby::new(tournament_id, count + 1, capacity);

                // A racing creator that picked the same sequence number
                // collides on the primary key and we retry.
                sqlx::query(
                    "INSERT INTO lobbies
                     (id, tournament_id, capacity, current_count, status, version, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&lobby.id)
                .bind(&lobby.tournament_id)
                .bind(lobby.capacity)
                .bind(lobby.current_count)
                .bind(&lobby.status)
                .bind(lobby.version)
                .bind(&lobby.created_at)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;

                lobby
            }
        };

        let taken: Vec<(String,)> =
            sqlx::query_as("SELECT team FROM assignments WHERE lobby_id = ? AND status = 'active'")
                .bind(&lobby.id)
                .fetch_all(&mut *tx)
                .await
                .map_err(store_error)?;

        let available: Vec<&String> = roster
            .iter()
            .filter(|team| !taken.iter().any(|(t,)| t == *team))
            .collect();

        // Server-side randomness only; the caller never influences the
        // pick. An empty set should not happen given capacity <= roster
        // size, but a roster/capacity mismatch must not panic.
        let team = {
            let mut rng = rand::thread_rng();
            match available.choose(&mut rng) {
                Some(team) => (*team).clone(),
                None => {
                    return Err(AppError::Unavailable(
                        "No teams left in this lobby".to_string(),
                    )
                    .into())
                }
            }
        };

        let assignment = Assignment::new(user_id, tournament_id, &lobby.id, &team);

        sqlx::query(
            "INSERT INTO assignments
             (id, user_id, tournament_id, lobby_id, team, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&assignment.id)
        .bind(&assignment.user_id)
        .bind(&assignment.tournament_id)
        .bind(&assignment.lobby_id)
        .bind(&assignment.team)
        .bind(&assignment.status)
        .bind(&assignment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        let new_count = lobby.current_count + 1;
        // The lobby row's own capacity drives the open->full transition;
        // it is fixed at lobby creation.
        let new_status = if new_count >= lobby.capacity {
            "full"
        } else {
            "open"
        };

        // Version compare-and-swap: if a concurrent join committed against
        // the same lobby snapshot first, no row matches and we retry.
        let updated = sqlx::query(
            "UPDATE lobbies
             SET current_count = ?, status = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(new_count)
        .bind(new_status)
        .bind(&lobby.id)
        .bind(lobby.version)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if updated.rows_affected() == 0 {
            return Err(Attempt::Conflict);
        }

        tx.commit().await.map_err(store_error)?;

        Ok(JoinOutcome {
            assignment,
            lobby_status: new_status.to_string(),
        })
    }
}

/// Identifiers end up inside queries and lobby ids; restrict them to a
/// safe charset and a sane length.
pub fn validate_id(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_ID_LEN
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(format!(
            "{} may only contain letters, digits, '_' and '-'",
            field
        )));
    }
    Ok(())
}

/// Classify a store failure: duplicate-join unique violations are fatal
/// and deterministic; other unique violations and lock contention are
/// retryable conflicts; everything else propagates.
fn store_error(err: sqlx::Error) -> Attempt {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message().to_string();
        if message.contains("assignments.tournament_id") {
            return Attempt::Fatal(AppError::AlreadyAssigned);
        }
        if matches!(db.kind(), ErrorKind::UniqueViolation)
            || message.contains("database is locked")
            || message.contains("database table is locked")
        {
            return Attempt::Conflict;
        }
    }
    Attempt::Fatal(err.into())
}
