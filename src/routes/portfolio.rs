use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::Table;
use crate::models::AppState;
use crate::portfolio::{load_section, PortfolioSnapshot, PortfolioView, SectionView, PUBLIC_SECTIONS};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/portfolio/{section}", get(get_section))
        .with_state(state)
}

async fn get_portfolio(State(state): State<AppState>) -> Json<PortfolioView> {
    let snapshot = PortfolioSnapshot::load(state.records.as_ref()).await;
    Json(state.resolver.resolve_view(snapshot).await)
}

async fn get_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
) -> AppResult<Json<SectionView>> {
    let table = section
        .parse::<Table>()
        .ok()
        .filter(|table| PUBLIC_SECTIONS.contains(table))
        .ok_or_else(|| AppError::NotFound(format!("section {section}")))?;

    let records = load_section(state.records.as_ref(), table).await?;
    Ok(Json(state.resolver.resolve_section(table, records).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Record, RecordStore};
    use crate::routes::tests::{body_json, test_state};
    use axum::{body::Body, http::{Request, StatusCode}};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_portfolio_view_with_one_broken_asset() {
        let (state, storage, records) = test_state();
        for (title, image) in [("a", "projects/a.png"), ("b", "projects/gone.png")] {
            records
                .insert(Table::Projects, Record::try_from(json!({"title": title, "image_url": image})).unwrap())
                .await
                .unwrap();
        }
        storage.fail_sign_for("projects/gone.png").await;

        let response = router(state)
            .oneshot(Request::get("/api/portfolio").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let projects = body["projects"].as_array().unwrap();
        assert!(projects[0]["signed_image_url"].is_string());
        assert!(projects[1]["signed_image_url"].is_null());
        let hint = body["refresh_after_secs"].as_u64().unwrap();
        assert!((2990..=3000).contains(&hint), "hint {hint}");
        assert!(body["profile"].is_null());
    }

    #[tokio::test]
    async fn test_private_and_unknown_sections_are_not_found() {
        let (state, _, _) = test_state();
        let app = router(state);

        for uri in ["/api/portfolio/contact_messages", "/api/portfolio/users"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_section_decodes_json_strings() {
        let (state, _, records) = test_state();
        records
            .insert(
                Table::Experience,
                Record::try_from(json!({"company": "Acme", "achievements": "[\"shipped\"]"})).unwrap(),
            )
            .await
            .unwrap();

        let response = router(state)
            .oneshot(Request::get("/api/portfolio/experience").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["section"], "experience");
        assert_eq!(body["records"][0]["achievements"], json!(["shipped"]));
        assert!(body["refresh_after_secs"].is_null());
    }
}
