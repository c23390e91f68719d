//! Annotation CRUD
//!
//! The author of a new annotation is always the session user, never a
//! client-supplied value.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use burnin_common::auth::SessionUser;
use burnin_common::db::TestAnnotation;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Body of POST /api/tests/:id/annotations and PUT /api/annotations/:id
#[derive(Debug, Deserialize)]
pub struct AnnotationRequest {
    pub annotation_text: String,
    #[serde(default)]
    pub annotation_group: Option<String>,
}

impl AnnotationRequest {
    /// Trimmed text and group; empty text is a 400, unknown group a 400
    async fn validated(self, pool: &SqlitePool) -> ApiResult<(String, Option<String>)> {
        let text = self.annotation_text.trim().to_string();
        if text.is_empty() {
            return Err(ApiError::BadRequest("annotation_text must not be empty".to_string()));
        }

        let group = self
            .annotation_group
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());

        if let Some(name) = &group {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM annotation_groups WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?;
            if exists.is_none() {
                return Err(ApiError::BadRequest(format!("Unknown annotation group '{}'", name)));
            }
        }

        Ok((text, group))
    }
}

/// GET /api/tests/:id/annotations
pub async fn list_annotations(
    State(state): State<AppState>,
    Path(test_id): Path<i64>,
) -> ApiResult<Json<Vec<TestAnnotation>>> {
    db::fetch_test(&state.db, test_id).await?;
    Ok(Json(db::fetch_annotations(&state.db, test_id).await?))
}

/// POST /api/tests/:id/annotations
pub async fn create_annotation(
    State(state): State<AppState>,
    Path(test_id): Path<i64>,
    Extension(user): Extension<SessionUser>,
    Json(request): Json<AnnotationRequest>,
) -> ApiResult<(StatusCode, Json<TestAnnotation>)> {
    db::fetch_test(&state.db, test_id).await?;
    let (text, group) = request.validated(&state.db).await?;

    let result = sqlx::query(
        "INSERT INTO test_annotations \
         (test_id, annotation_text, annotation_group, created_by, created_by_name) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(test_id)
    .bind(&text)
    .bind(&group)
    .bind(&user.email)
    .bind(&user.name)
    .execute(&state.db)
    .await?;

    let id = result.last_insert_rowid();
    info!(annotation = id, test = test_id, user = %user.email, "Annotation created");

    Ok((StatusCode::CREATED, Json(db::fetch_annotation(&state.db, id).await?)))
}

/// PUT /api/annotations/:id
pub async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(user): Extension<SessionUser>,
    Json(request): Json<AnnotationRequest>,
) -> ApiResult<Json<TestAnnotation>> {
    db::fetch_annotation(&state.db, id).await?;
    let (text, group) = request.validated(&state.db).await?;

    sqlx::query(
        "UPDATE test_annotations \
         SET annotation_text = ?, annotation_group = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(&text)
    .bind(&group)
    .bind(id)
    .execute(&state.db)
    .await?;

    info!(annotation = id, user = %user.email, "Annotation updated");
    Ok(Json(db::fetch_annotation(&state.db, id).await?))
}

/// DELETE /api/annotations/:id
pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM test_annotations WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Annotation {} not found", id)));
    }

    info!(annotation = id, user = %user.email, "Annotation deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Build annotation routes
pub fn annotation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/tests/:id/annotations",
            get(list_annotations).post(create_annotation),
        )
        .route(
            "/api/annotations/:id",
            put(update_annotation).delete(delete_annotation),
        )
}
