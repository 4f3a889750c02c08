//! Storage endpoints
//!
//! The three storage operations the front end and admin panel call directly.
//! Each answers with a [`StorageOutcome`]: `success` plus the payload, or
//! `success: false` with the backend's message.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{AppState, DeleteRequest, SignRequest, StorageOutcome};
use crate::storage::{is_external, FileUpload, StorageError};

type Outcome = (StatusCode, Json<StorageOutcome>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/storage/sign", post(sign_url))
        .route("/api/storage/upload", post(upload_file))
        .route("/api/storage/delete", post(delete_file))
        .with_state(state)
}

fn failure(error: &StorageError) -> Outcome {
    let (status, body) = StorageOutcome::failed(error);
    (status, Json(body))
}

fn bad_request(error: String) -> Outcome {
    let body = StorageOutcome {
        success: false,
        error: Some(error),
        ..StorageOutcome::default()
    };
    (StatusCode::BAD_REQUEST, Json(body))
}

async fn sign_url(State(state): State<AppState>, Json(request): Json<SignRequest>) -> Outcome {
    let storage = &state.config.storage;
    let ttl = request
        .expires_in
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| storage.signed_url_ttl());
    if ttl > storage.max_signed_url_ttl() {
        return failure(&StorageError::InvalidTtl(ttl.as_secs()));
    }

    match state.issuer.issue(&request.path, ttl).await {
        Ok(signed) => (StatusCode::OK, Json(StorageOutcome::signed(signed))),
        Err(e) => failure(&e),
    }
}

async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Outcome {
    let mut folder = String::new();
    let mut file: Option<FileUpload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Malformed upload: {e}")),
        };

        match field.name() {
            Some("folder") => {
                folder = field.text().await.unwrap_or_default();
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(e) => return bad_request(format!("Malformed upload: {e}")),
                };
                let mut upload = FileUpload::new(file_name, data);
                if let Some(content_type) = content_type {
                    upload = upload.with_content_type(content_type);
                }
                file = Some(upload);
            }
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let Some(file) = file else {
        return failure(&StorageError::EmptyFile);
    };

    match state.uploader.upload(&file, &folder).await {
        Ok(path) => (StatusCode::OK, Json(StorageOutcome::uploaded(path))),
        Err(e) => failure(&e),
    }
}

async fn delete_file(State(state): State<AppState>, Json(request): Json<DeleteRequest>) -> Outcome {
    let Some(reference) = request.path.filter(|p| !p.trim().is_empty()) else {
        return (StatusCode::OK, Json(StorageOutcome::deleted()));
    };

    let path = match state.issuer.normalizer().normalize(&reference) {
        Ok(path) => path,
        Err(e) => return failure(&StorageError::from(e)),
    };
    if is_external(&path) {
        info!(reference = %path, "Not deleting asset outside the bucket");
        return (StatusCode::OK, Json(StorageOutcome::deleted()));
    }

    match state.uploader.delete(&path).await {
        Ok(path) => {
            state.issuer.cache().invalidate(&path).await;
            (StatusCode::OK, Json(StorageOutcome::deleted()))
        }
        Err(e) => failure(&e),
    }
}
