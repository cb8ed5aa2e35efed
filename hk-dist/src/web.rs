//! `hkdist web`: the release catalogue REST API.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use crate::config::DistConfig;
use crate::database::DatabaseManager;
use axum::http::HeaderValue;
use axum::http::header::{X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::routing::{get, put};
use axum::{Router, middleware};
use hk_core::{LogContext, open_store};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let uploads = Router::new()
        .route("/{cmd}/current/{plat}", put(handlers::put_current))
        .route("/{cmd}/{ver}/{plat}", put(handlers::put_release))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_staff,
        ));

    let downloads = Router::new()
        .route("/health", get(handlers::health))
        .route("/release.json", get(handlers::list_releases))
        .route("/{cmd}", get(handlers::get_gz))
        .route("/{cmd}/current/{plat}", get(handlers::get_current))
        .route("/{cmd}/{ver}/{plat}", get(handlers::get_release))
        .route("/{cmd}/{oldver}/next/{plat}", get(handlers::get_next));

    // The last layer added sees the request first
    Router::new()
        .merge(uploads)
        .merge(downloads)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::https_only,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect to the database and stores, then serve until the process exits.
pub async fn run(config: DistConfig) -> anyhow::Result<()> {
    let context = LogContext::new("web", "hkdist");
    config.require(&["DATABASE_URL", "S3DISTURL", "S3PATCHURL"])?;

    let db = DatabaseManager::new(&config.database).await?;
    db.ensure_schema().await?;
    let dist_store = open_store(&config.dist_store).await?;
    let patch_store = open_store(&config.patch_store).await?;

    let port = config.server.port;
    let state = AppState::new(Arc::new(db), dist_store, patch_store, config.server)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    context.info(&format!("listening on http://0.0.0.0:{}", port));
    axum::serve(listener, app).await?;
    Ok(())
}
