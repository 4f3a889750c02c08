//! Static File Serving
//!
//! Serves the portfolio and admin front end from `STATIC_DIR`. Unknown paths
//! fall back to `index.html` so client-side routes resolve.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse},
    Router,
};
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

pub fn router(static_dir: &str) -> Router {
    let dir = Path::new(static_dir);
    if !dir.is_dir() {
        warn!(path = %dir.display(), "Static files directory not found, serving API only");
        return Router::new().fallback(frontend_missing);
    }

    info!(path = %dir.display(), "Serving static files");
    let serve_dir = ServeDir::new(dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(dir.join("index.html")));

    Router::new().fallback_service(serve_dir)
}

async fn frontend_missing() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Html(
            "<!DOCTYPE html><html><head><title>portfolio-vault</title></head><body>\
             <h1>portfolio-vault</h1><p>The API is running. No front end was found in \
             <code>STATIC_DIR</code>.</p><p><a href=\"/api/health\">API health</a></p></body></html>",
        ),
    )
}
