// Rate limiting for public write endpoints

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::models::AppState;
use crate::types::AppError;

/// Global (unkeyed) quota shared by all contact submissions.
pub async fn contact_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.contact_limiter.check().is_err() {
        warn!("Contact rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}
