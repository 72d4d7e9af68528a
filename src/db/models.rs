use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A competition with a fixed team roster. The roster is stored as a JSON
/// array and never changes after creation; the allocator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub roster: String,
    pub lobby_size: i64,
    pub status: String,
    pub created_at: String,
}

impl Tournament {
    pub fn new(id: String, name: String, teams: &[String], lobby_size: i64) -> Self {
        Self {
            id,
            name,
            roster: serde_json::to_string(teams).unwrap_or_else(|_| "[]".to_string()),
            lobby_size,
            status: "active".to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Parsed team list. Empty if the roster column holds no usable JSON;
    /// the allocator substitutes a default roster in that case.
    pub fn teams(&self) -> Vec<String> {
        serde_json::from_str(&self.roster).unwrap_or_default()
    }
}

/// One capacity-bounded room of users within a tournament. Fills
/// monotonically: open until current_count reaches capacity, then full,
/// never back. The version column is the optimistic-concurrency guard.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lobby {
    pub id: String,
    pub tournament_id: String,
    pub capacity: i64,
    pub current_count: i64,
    pub status: String,
    pub version: i64,
    pub created_at: String,
}

impl Lobby {
    pub fn new(tournament_id: &str, sequence: i64, capacity: i64) -> Self {
        Self {
            id: format!("{}_lobby_{}", tournament_id, sequence),
            tournament_id: tournament_id.to_string(),
            capacity,
            current_count: 0,
            status: "open".to_string(),
            version: 0,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Durable record binding one user to one team within one lobby. Created
/// exactly once per (user, tournament) and never mutated afterwards.
/// Status values other than "active" are reserved.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: String,
    pub user_id: String,
    pub tournament_id: String,
    pub lobby_id: String,
    pub team: String,
    pub status: String,
    pub created_at: String,
}

impl Assignment {
    pub fn new(user_id: &str, tournament_id: &str, lobby_id: &str, team: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tournament_id: tournament_id.to_string(),
            lobby_id: lobby_id.to_string(),
            team: team.to_string(),
            status: "active".to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
