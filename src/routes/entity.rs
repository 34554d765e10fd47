//! Entity CRUD routes built from the resolved model.
//! Paths are parameterized so handlers resolve the entity by segment; one
//! router serves every configured entity, including its method actions.

use crate::handlers::entity::{create, delete as delete_handler, execute_method, list, read, update};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/:id",
            get(read).put(update).delete(delete_handler),
        )
        .route("/:path_segment/:id/action/:method_name", post(execute_method))
        .with_state(state)
}
