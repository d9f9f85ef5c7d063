use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod report;
pub mod sources;

use report::DocumentRenderer;
use sources::MetricsSources;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: config::AppConfig,
    /// Where campaign metrics are read from, per platform.
    pub sources: MetricsSources,
    pub renderer: Arc<dyn DocumentRenderer>,
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_router = Router::new()
        .route("/token", post(handlers::auth::login))
        .route("/me", get(handlers::auth::me));

    let client_router = Router::new()
        .route(
            "/",
            get(handlers::clients::list_clients).post(handlers::clients::create_client),
        )
        .route(
            "/:id",
            get(handlers::clients::get_client)
                .put(handlers::clients::update_client)
                .delete(handlers::clients::delete_client),
        )
        .route(
            "/:id/campaigns",
            get(handlers::campaigns::list_campaigns).post(handlers::campaigns::create_campaign),
        )
        .route("/:id/sync", post(handlers::campaigns::sync_campaigns));

    let campaign_router = Router::new()
        .route("/:id", axum::routing::delete(handlers::campaigns::delete_campaign))
        .route("/:id/metrics", post(handlers::campaigns::ingest_metrics));

    let user_router = Router::new()
        .route(
            "/",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        );

    let report_router = Router::new()
        .route("/export", get(handlers::reports::export))
        .route("/export-client/:client_id", get(handlers::reports::export_client))
        .route("/summary", get(handlers::reports::summary));

    Router::new()
        // Liveness check, no auth
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .nest("/auth", auth_router)
        .nest("/clients", client_router)
        .nest("/campaigns", campaign_router)
        .nest("/users", user_router)
        .nest("/reports", report_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
