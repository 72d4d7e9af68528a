use draw_server::{allocator, api, auth, config, create_app, db, rate_limit};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load config
    let config = config::Config::from_env();
    tracing::info!("Starting draw server on {}", config.server_addr());

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    // Run migrations
    db::run_migrations(&pool).await?;

    // Create JWT manager
    let jwt_manager = Arc::new(auth::JwtManager::new(config.jwt_secret.clone()));

    // Create the lobby allocator
    let lobby_allocator = Arc::new(allocator::LobbyAllocator::new(pool.clone()));

    // Create shared state for auth endpoints
    let auth_state = Arc::new(api::AppState {
        pool: pool.clone(),
        jwt_manager: jwt_manager.clone(),
    });

    // Create shared state for tournament endpoints; joins are limited to
    // 2/sec per user with a burst of 5
    let tournament_state = Arc::new(api::TournamentAppState {
        pool: pool.clone(),
        jwt_manager,
        allocator: lobby_allocator,
        join_limiter: Arc::new(rate_limit::KeyedRateLimiter::new(2.0, 5.0)),
    });

    // Build router using lib function
    let app = create_app(auth_state, tournament_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Server listening on {}", config.server_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
