//! Admin panel endpoints
//!
//! Creates and updates are multipart: a `record` part holding the JSON
//! fields, plus one file part per asset slot, named after the slot's field
//! (`image_url`, `resume_url`, ...). File parts with an empty body are
//! ignored, which is what browsers send for an untouched file input.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::Value;

use crate::db::{Record, RecordId, Table};
use crate::models::AppState;
use crate::storage::{FileUpload, SaveReport, SlotFile};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/{table}", get(list_records).post(create_record))
        .route("/api/admin/{table}/{id}", put(update_record).delete(delete_record))
        .route("/api/admin/{table}/{id}/read", post(mark_read))
        .with_state(state)
}

fn parse_table(name: &str) -> AppResult<Table> {
    name.parse::<Table>()
        .map_err(|e| AppError::NotFound(e.to_string()))
}

struct SavePayload {
    fields: Record,
    files: Vec<SlotFile>,
}

fn malformed(e: impl std::fmt::Display) -> AppError {
    AppError::InvalidRequest(format!("Malformed form data: {e}"))
}

async fn read_payload(mut multipart: Multipart) -> AppResult<SavePayload> {
    let mut fields = Record::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "record" {
            let text = field.text().await.map_err(malformed)?;
            let value: Value = serde_json::from_str(&text).map_err(malformed)?;
            fields = Record::try_from(value).map_err(malformed)?;
        } else if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(malformed)?;
            if data.is_empty() {
                continue;
            }
            let mut upload = FileUpload::new(file_name, data);
            if let Some(content_type) = content_type {
                upload = upload.with_content_type(content_type);
            }
            files.push(SlotFile::new(name, upload));
        }
    }

    Ok(SavePayload { fields, files })
}

async fn list_records(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<Json<Vec<Record>>> {
    let table = parse_table(&table)?;
    Ok(Json(state.admin.list(table).await?))
}

async fn create_record(
    State(state): State<AppState>,
    Path(table): Path<String>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<SaveReport>)> {
    let table = parse_table(&table)?;
    let payload = read_payload(multipart).await?;
    let report = state.admin.create(table, payload.fields, payload.files).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    multipart: Multipart,
) -> AppResult<Json<SaveReport>> {
    let table = parse_table(&table)?;
    let payload = read_payload(multipart).await?;
    let report = state
        .admin
        .update(table, &RecordId(id), payload.fields, payload.files)
        .await?;
    Ok(Json(report))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> AppResult<Json<SaveReport>> {
    let table = parse_table(&table)?;
    Ok(Json(state.admin.delete(table, &RecordId(id)).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> AppResult<Json<Record>> {
    if parse_table(&table)? != Table::ContactMessages {
        return Err(AppError::NotFound(format!("{table} has no read flag")));
    }
    Ok(Json(state.admin.mark_read(&RecordId(id)).await?))
}
