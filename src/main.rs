use std::sync::Arc;

use mentorship_service::{
    config::Config,
    error::AppError,
    logging, routes,
    security::jwt::TokenService,
    state::AppState,
    store::{postgres, PgStore},
    websocket::ConnectionRegistry,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Config::from_env()?;

    let pool = postgres::connect(&cfg.database_url)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;

    // Run embedded migrations (idempotent); schema drift is fatal.
    postgres::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::StartServer(format!("database migrations failed: {e}")))?;

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        tokens: Arc::new(TokenService::new(&cfg.jwt_secret)),
        registry: ConnectionRegistry::new(),
        config: Arc::new(cfg),
    };
    let app = routes::build_router(state);

    tracing::info!(%bind_addr, "starting mentorship-service");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
