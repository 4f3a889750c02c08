//! API Routes
//!
//! - `/api/health`, `/api/ready` - liveness and database readiness
//! - `/api/portfolio` - public sections with signed asset URLs
//! - `/api/storage/*` - sign, upload and delete bucket objects
//! - `/api/admin/*` - record management for the admin panel
//! - `/api/contact` - visitor messages (rate limited)
//! - `/` - static front-end files

pub mod admin;
pub mod contact;
pub mod files;
pub mod health;
pub mod portfolio;
pub mod static_files;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
///
/// API routes take precedence; anything else falls through to the static files.
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let body_limit = state.config.server.max_upload_bytes;
    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    let static_dir = state.config.server.static_dir.clone();

    let api_router = Router::new()
        .merge(health::router(state.clone()))
        .merge(portfolio::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(admin::router(state.clone()))
        .merge(contact::router(state));

    Router::new()
        .merge(api_router)
        .merge(static_files::router(&static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
