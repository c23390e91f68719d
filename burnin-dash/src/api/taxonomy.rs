//! Annotation groups and quick options

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use burnin_common::db::{AnnotationGroup, AnnotationQuickOption};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn required(value: &str, field: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ========================================
// Groups
// ========================================

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// GET /api/annotation-groups
pub async fn list_groups(State(state): State<AppState>) -> ApiResult<Json<Vec<AnnotationGroup>>> {
    let groups = sqlx::query_as::<_, AnnotationGroup>(
        "SELECT id, name, description, color FROM annotation_groups ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(groups))
}

/// POST /api/annotation-groups
pub async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<AnnotationGroup>)> {
    let name = required(&request.name, "name")?;

    let result = sqlx::query(
        "INSERT INTO annotation_groups (name, description, color) VALUES (?, ?, ?)",
    )
    .bind(&name)
    .bind(optional(request.description))
    .bind(optional(request.color))
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::conflict_on_unique(e, format!("Group '{}' already exists", name)))?;

    let group = sqlx::query_as::<_, AnnotationGroup>(
        "SELECT id, name, description, color FROM annotation_groups WHERE id = ?",
    )
    .bind(result.last_insert_rowid())
    .fetch_one(&state.db)
    .await?;

    info!(group = %group.name, "Annotation group created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// DELETE /api/annotation-groups/:id
///
/// Quick options of the group become ungrouped; existing annotations keep
/// the group name they were filed under.
pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM annotation_groups WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Annotation group {} not found", id)));
    }

    info!(group = id, "Annotation group deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Quick options
// ========================================

#[derive(Debug, Deserialize)]
pub struct CreateQuickOptionRequest {
    pub option_text: String,
    #[serde(default)]
    pub group_id: Option<i64>,
}

const QUICK_OPTION_SELECT: &str = "SELECT q.id, q.option_text, q.group_id, g.name AS group_name \
     FROM annotation_quick_options q LEFT JOIN annotation_groups g ON g.id = q.group_id";

/// GET /api/quick-options
pub async fn list_quick_options(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AnnotationQuickOption>>> {
    let sql = format!("{} ORDER BY g.name, q.option_text", QUICK_OPTION_SELECT);
    let options = sqlx::query_as::<_, AnnotationQuickOption>(&sql)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(options))
}

/// POST /api/quick-options
pub async fn create_quick_option(
    State(state): State<AppState>,
    Json(request): Json<CreateQuickOptionRequest>,
) -> ApiResult<(StatusCode, Json<AnnotationQuickOption>)> {
    let text = required(&request.option_text, "option_text")?;

    if let Some(group_id) = request.group_id {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM annotation_groups WHERE id = ?")
            .bind(group_id)
            .fetch_optional(&state.db)
            .await?;
        if exists.is_none() {
            return Err(ApiError::BadRequest(format!("Unknown annotation group {}", group_id)));
        }
    }

    let result = sqlx::query(
        "INSERT INTO annotation_quick_options (option_text, group_id) VALUES (?, ?)",
    )
    .bind(&text)
    .bind(request.group_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::conflict_on_unique(e, format!("Quick option '{}' already exists", text)))?;

    let sql = format!("{} WHERE q.id = ?", QUICK_OPTION_SELECT);
    let option = sqlx::query_as::<_, AnnotationQuickOption>(&sql)
        .bind(result.last_insert_rowid())
        .fetch_one(&state.db)
        .await?;

    info!(option = %option.option_text, "Quick option created");
    Ok((StatusCode::CREATED, Json(option)))
}

/// DELETE /api/quick-options/:id
pub async fn delete_quick_option(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM annotation_quick_options WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Quick option {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Build taxonomy routes
pub fn taxonomy_routes() -> Router<AppState> {
    Router::new()
        .route("/api/annotation-groups", get(list_groups).post(create_group))
        .route("/api/annotation-groups/:id", delete(delete_group))
        .route(
            "/api/quick-options",
            get(list_quick_options).post(create_quick_option),
        )
        .route("/api/quick-options/:id", delete(delete_quick_option))
}
