//! Auth routes under /auth.

use crate::handlers::auth::{change_password, login, logout, me, refresh, register};
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/auth/change-password", patch(change_password))
        .with_state(state)
}
