//! Test run list, detail, telemetry and per-inverter history

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use burnin_common::db::{TestAnnotation, TestDataPoint, TestRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::db::{self, TestSummary};
use crate::error::{ApiError, ApiResult};
use crate::filters::TestFilter;
use crate::pagination::{calculate_pagination, Pagination};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TestListResponse {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub tests: Vec<TestSummary>,
}

/// GET /api/tests
///
/// 100 rows per page, newest first.
pub async fn list_tests(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<TestListResponse>> {
    let status = filter.validated_status()?;

    let total = db::count_tests(&state.db, &filter, status).await?;
    let pagination = calculate_pagination(total, filter.page);
    let tests = db::list_tests(
        &state.db,
        &filter,
        status,
        Some((pagination.page_size, pagination.offset)),
    )
    .await?;

    Ok(Json(TestListResponse { pagination, tests }))
}

#[derive(Debug, Serialize)]
pub struct TestDetailResponse {
    #[serde(flatten)]
    pub test: TestRecord,
    pub sample_count: i64,
    pub annotations: Vec<TestAnnotation>,
}

/// GET /api/tests/:id
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TestDetailResponse>> {
    let test = db::fetch_test(&state.db, id).await?;
    let sample_count = db::count_samples(&state.db, id).await?;
    let annotations = db::fetch_annotations(&state.db, id).await?;

    Ok(Json(TestDetailResponse {
        test,
        sample_count,
        annotations,
    }))
}

/// `?fields=a,b&max_points=N`
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub fields: Option<String>,
    pub max_points: Option<usize>,
}

impl DataQuery {
    fn field_set(&self) -> Option<BTreeSet<String>> {
        let fields: BTreeSet<String> = self
            .fields
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        (!fields.is_empty()).then_some(fields)
    }
}

#[derive(Debug, Serialize)]
pub struct TestDataResponse {
    pub test_id: i64,
    pub total_points: usize,
    pub returned_points: usize,
    /// Reading names present in the returned points
    pub fields: Vec<String>,
    pub points: Vec<TestDataPoint>,
}

/// Keep only the requested readings in each point
pub fn project_fields(points: &mut [TestDataPoint], fields: &BTreeSet<String>) {
    for point in points {
        point.readings.0.retain(|name, _| fields.contains(name));
    }
}

/// Keep every k-th point so at most `max_points` remain
///
/// The first point is always kept; `max_points == 0` means no limit.
pub fn downsample<T>(points: Vec<T>, max_points: usize) -> Vec<T> {
    if max_points == 0 || points.len() <= max_points {
        return points;
    }
    let stride = points.len().div_ceil(max_points);
    points.into_iter().step_by(stride).collect()
}

fn field_names(points: &[TestDataPoint]) -> Vec<String> {
    points
        .iter()
        .flat_map(|p| p.readings.0.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// GET /api/tests/:id/data
pub async fn get_test_data(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DataQuery>,
) -> ApiResult<Json<TestDataResponse>> {
    db::fetch_test(&state.db, id).await?;

    let mut points = db::fetch_samples(&state.db, id).await?;
    let total_points = points.len();

    if let Some(fields) = query.field_set() {
        project_fields(&mut points, &fields);
    }
    let points = downsample(points, query.max_points.unwrap_or(0));

    Ok(Json(TestDataResponse {
        test_id: id,
        total_points,
        returned_points: points.len(),
        fields: field_names(&points),
        points,
    }))
}

#[derive(Debug, Serialize)]
pub struct InverterHistoryResponse {
    pub serial_number: String,
    pub total_tests: usize,
    /// Count per verdict
    pub by_status: BTreeMap<String, usize>,
    pub tests: Vec<TestSummary>,
}

/// GET /api/inverters/:serial/tests
pub async fn inverter_tests(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<InverterHistoryResponse>> {
    let known: Option<i64> = sqlx::query_scalar("SELECT id FROM inverters WHERE serial_number = ?")
        .bind(&serial)
        .fetch_optional(&state.db)
        .await?;
    if known.is_none() {
        return Err(ApiError::NotFound(format!("Inverter {} not found", serial)));
    }

    let tests = db::list_inverter_tests(&state.db, &serial).await?;
    let mut by_status = BTreeMap::new();
    for test in &tests {
        *by_status.entry(test.overall_status.to_string()).or_insert(0) += 1;
    }

    Ok(Json(InverterHistoryResponse {
        serial_number: serial,
        total_tests: tests.len(),
        by_status,
        tests,
    }))
}

/// Build test browsing routes
pub fn test_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tests", get(list_tests))
        .route("/api/tests/:id", get(get_test))
        .route("/api/tests/:id/data", get(get_test_data))
        .route("/api/inverters/:serial/tests", get(inverter_tests))
}
