use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::middleware::contact_rate_limit;
use crate::models::AppState;
use crate::portfolio::ContactForm;
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/contact", post(submit_contact))
        .route_layer(middleware::from_fn_with_state(state.clone(), contact_rate_limit))
        .with_state(state)
}

async fn submit_contact(
    State(state): State<AppState>,
    Json(form): Json<ContactForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let stored = state.contact.submit(form).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": stored.get("id").cloned().unwrap_or(Value::Null),
        })),
    ))
}
