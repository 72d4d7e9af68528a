pub mod auth;
pub mod tournaments;

pub use auth::{router as auth_router, AppState};
pub use tournaments::{router as tournaments_router, TournamentAppState};
