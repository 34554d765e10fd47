//! Server entrypoint: load settings and entity configs, bootstrap the
//! database, mount routes, serve HTTP + WebSocket.

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use orgflow::auth::TokenIssuer;
use orgflow::{
    auth_routes, common_routes, entity_routes, load_from_dir, AppState, Hub, Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("orgflow=info".parse()?))
        .init();

    let settings = Settings::from_env()?;

    let pool = orgflow::connect(&settings.database_url).await?;
    let model = load_from_dir(&settings.entity_config_dir).await?;
    orgflow::ensure_tables(&pool, &model).await?;
    orgflow::ensure_users_table(&pool).await?;
    for entity in &model.entities {
        tracing::info!(
            entity = %entity.name,
            path = %format!("/api/{}", entity.path_segment),
            methods = entity.methods.len(),
            "mounted entity"
        );
    }

    let tokens = TokenIssuer::new(
        &settings.jwt_secret,
        settings.jwt_expires_in,
        settings.jwt_refresh_expires_in,
    );
    let state = AppState {
        pool,
        model: Arc::new(model),
        hub: Hub::new(),
        tokens: Arc::new(tokens),
        settings: Arc::new(settings.clone()),
    };

    let cors = if settings.allows_any_origin() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = settings
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api = Router::new()
        .merge(common_routes(state.clone()))
        .merge(auth_routes(state.clone()))
        .merge(entity_routes(state.clone()));
    let ws = Router::new()
        .route("/ws", get(orgflow::ws::ws_upgrade))
        .with_state(state);

    let app = Router::new().nest("/api", api).merge(ws).layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(cors),
    );

    let listener = TcpListener::bind(("0.0.0.0", settings.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
