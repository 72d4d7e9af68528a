//! Structured audit logging for security-relevant events.
//!
//! Tournament lifecycle, draw outcomes, and auth events are logged with
//! structured fields under the "audit" target.

/// Log a tournament lifecycle event (created, closed)
pub fn log_tournament_event(tournament_id: &str, event: &str, details: &str) {
    tracing::info!(
        target: "audit",
        event = "tournament",
        tournament_id = tournament_id,
        tournament_event = event,
        details = details,
        "Tournament {}: {} - {}",
        tournament_id,
        event,
        details
    );
}

/// Log a successful draw
pub fn log_join(tournament_id: &str, user_id: &str, lobby_id: &str, team: &str) {
    tracing::info!(
        target: "audit",
        event = "join",
        tournament_id = tournament_id,
        user_id = user_id,
        lobby_id = lobby_id,
        team = team,
        "Join: {} drew {} in lobby {} of tournament {}",
        user_id,
        team,
        lobby_id,
        tournament_id
    );
}

/// Log a rejected draw attempt
pub fn log_join_rejected(tournament_id: &str, user_id: &str, reason: &str) {
    tracing::info!(
        target: "audit",
        event = "join_rejected",
        tournament_id = tournament_id,
        user_id = user_id,
        reason = reason,
        "Join rejected: {} in tournament {} - {}",
        user_id,
        tournament_id,
        reason
    );
}

/// Log an authentication event
pub fn log_auth_event(username: &str, event: &str, success: bool) {
    if success {
        tracing::info!(
            target: "audit",
            event = "auth",
            username = username,
            auth_event = event,
            success = success,
            "Auth: {} - {} (success={})",
            event,
            username,
            success
        );
    } else {
        tracing::warn!(
            target: "audit",
            event = "auth",
            username = username,
            auth_event = event,
            success = success,
            "Auth: {} - {} (success={})",
            event,
            username,
            success
        );
    }
}

/// Log a security event (rate limiting, unauthorized access, etc.)
pub fn log_security_event(user_id: &str, event: &str, details: &str) {
    tracing::warn!(
        target: "audit",
        event = "security",
        user_id = user_id,
        security_event = event,
        details = details,
        "Security: {} - {} - {}",
        event,
        user_id,
        details
    );
}
