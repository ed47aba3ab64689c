use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::middleware;
use crate::middleware::auth::require_auth;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub mod auth;
use auth::{login, refresh, register};
pub mod sessions;
use sessions::{book_session, cancel_session, complete_session, confirm_session, list_sessions};
pub mod chat;
use chat::chat_history;
pub mod profiles;
use profiles::{get_profile, list_mentors, update_my_profile};

pub fn build_router(state: AppState) -> Router {
    // Open endpoints: introspection, account lifecycle, and the websocket
    // upgrade, which authenticates in-band after the handshake.
    let public = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/ws", get(ws_handler));

    // Everything else requires a verified access token.
    let api = Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/book", post(book_session))
        .route("/sessions/{id}/confirm", put(confirm_session))
        .route("/sessions/{id}/cancel", put(cancel_session))
        .route("/sessions/{id}/complete", put(complete_session))
        .route("/chat/{other_user_id}", get(chat_history))
        .route("/profile", put(update_my_profile))
        .route("/profiles/{user_id}", get(get_profile))
        .route("/mentors", get(list_mentors))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let router = public.merge(api);
    middleware::with_defaults(router)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
