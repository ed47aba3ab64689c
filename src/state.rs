use std::sync::Arc;

use crate::config::Config;
use crate::security::jwt::TokenService;
use crate::store::Store;
use crate::websocket::ConnectionRegistry;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenService>,
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
}
