//! Annotation analytics: contributors, failure breakdowns and coverage

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use burnin_common::db::OverallStatus;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::types::Json as SqlJson;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::{BTreeMap, HashMap};

use crate::db;
use crate::error::ApiResult;
use crate::filters::{TestFilter, TESTS_FROM};
use crate::AppState;

/// Channel status values that count as healthy
const HEALTHY_CHANNEL_STATES: &[&str] = &["OK", "PASS", "PASSED", "GOOD", "NORMAL", "N/A", "NA", "-"];

/// Channels whose status is not a healthy value
pub fn failing_channels(channels: &BTreeMap<String, String>) -> impl Iterator<Item = &str> {
    channels.iter().filter_map(|(name, state)| {
        let state = state.trim().to_ascii_uppercase();
        if state.is_empty() || HEALTHY_CHANNEL_STATES.contains(&state.as_str()) {
            None
        } else {
            Some(name.as_str())
        }
    })
}

/// `annotated / total`, 0 when there is nothing to cover
pub fn coverage_ratio(annotated: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        annotated as f64 / total as f64
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct Contributor {
    pub email: String,
    pub name: Option<String>,
    pub annotations: i64,
    pub tests_annotated: i64,
    pub last_activity: NaiveDateTime,
}

/// GET /api/analytics/contributors
pub async fn contributors(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<Vec<Contributor>>> {
    let status = filter.validated_status()?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT a.created_by AS email, MAX(a.created_by_name) AS name, \
         COUNT(*) AS annotations, COUNT(DISTINCT a.test_id) AS tests_annotated, \
         MAX(a.updated_at) AS last_activity",
    );
    qb.push(TESTS_FROM);
    qb.push(" JOIN test_annotations a ON a.test_id = t.id");
    filter.push_where(&mut qb, status);
    qb.push(" GROUP BY a.created_by ORDER BY annotations DESC, email");

    Ok(Json(qb.build_query_as::<Contributor>().fetch_all(&state.db).await?))
}

#[derive(Debug, Serialize, FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct FailureBreakdown {
    pub total_failed: i64,
    pub unannotated: i64,
    /// Failed tests per annotation group (a test counts once per group)
    pub by_group: Vec<LabelCount>,
    pub by_description: Vec<LabelCount>,
    /// Failed tests per channel reporting a non-healthy status
    pub by_channel: Vec<LabelCount>,
}

#[derive(Debug, FromRow)]
struct ChannelRow {
    channel_status: SqlJson<BTreeMap<String, String>>,
}

/// GET /api/analytics/failures
///
/// The `result` filter is ignored; only FAIL tests are considered.
pub async fn failures(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<FailureBreakdown>> {
    filter.validated_status()?;
    let fail = Some(OverallStatus::Fail);

    let total_failed = db::count_tests(&state.db, &filter, fail).await?;
    let annotated = count_annotated(&state, &filter).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT COALESCE(NULLIF(TRIM(a.annotation_group), ''), 'Ungrouped') AS label, \
         COUNT(DISTINCT t.id) AS count",
    );
    qb.push(TESTS_FROM);
    qb.push(" JOIN test_annotations a ON a.test_id = t.id");
    filter.push_where(&mut qb, fail);
    qb.push(" GROUP BY 1 ORDER BY 2 DESC, 1");
    let by_group = qb.build_query_as::<LabelCount>().fetch_all(&state.db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT COALESCE(NULLIF(TRIM(t.failure_description), ''), 'Unspecified') AS label, \
         COUNT(*) AS count",
    );
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, fail);
    qb.push(" GROUP BY 1 ORDER BY 2 DESC, 1");
    let by_description = qb.build_query_as::<LabelCount>().fetch_all(&state.db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT t.channel_status");
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, fail);
    let rows = qb.build_query_as::<ChannelRow>().fetch_all(&state.db).await?;

    let mut channel_counts: HashMap<String, i64> = HashMap::new();
    for row in &rows {
        for channel in failing_channels(&row.channel_status.0) {
            *channel_counts.entry(channel.to_string()).or_insert(0) += 1;
        }
    }
    let mut by_channel: Vec<LabelCount> = channel_counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    by_channel.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    Ok(Json(FailureBreakdown {
        total_failed,
        unannotated: total_failed - annotated,
        by_group,
        by_description,
        by_channel,
    }))
}

/// Failed tests carrying at least one annotation
async fn count_annotated(state: &AppState, filter: &TestFilter) -> ApiResult<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, Some(OverallStatus::Fail));
    qb.push(" AND EXISTS (SELECT 1 FROM test_annotations a WHERE a.test_id = t.id)");
    Ok(qb.build_query_scalar::<i64>().fetch_one(&state.db).await?)
}

#[derive(Debug, Serialize)]
pub struct CoverageResponse {
    pub total_failed: i64,
    pub annotated_failed: i64,
    /// `annotated_failed / total_failed`, 0 when nothing failed
    pub coverage: f64,
}

/// GET /api/analytics/coverage
pub async fn coverage(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<CoverageResponse>> {
    filter.validated_status()?;

    let total_failed = db::count_tests(&state.db, &filter, Some(OverallStatus::Fail)).await?;
    let annotated_failed = count_annotated(&state, &filter).await?;

    Ok(Json(CoverageResponse {
        total_failed,
        annotated_failed,
        coverage: coverage_ratio(annotated_failed, total_failed),
    }))
}

/// Build analytics routes
pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analytics/contributors", get(contributors))
        .route("/api/analytics/failures", get(failures))
        .route("/api/analytics/coverage", get(coverage))
}
