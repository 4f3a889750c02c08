// portfolio-vault - portfolio and admin backend for a private asset bucket

pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod portfolio;
pub mod routes;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
