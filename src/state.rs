//! Shared application state for all routes and the WebSocket layer.

use crate::auth::TokenIssuer;
use crate::config::ResolvedModel;
use crate::settings::Settings;
use crate::ws::Hub;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    /// Loaded once at startup; immutable for the process lifetime.
    pub model: Arc<ResolvedModel>,
    pub hub: Hub,
    pub tokens: Arc<TokenIssuer>,
    pub settings: Arc<Settings>,
}
