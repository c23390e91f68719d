//! Dashboard statistics
//!
//! All counts honour the common filters and exclude debug firmware.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::error::ApiResult;
use crate::filters::{TestFilter, TESTS_FROM};
use crate::AppState;

const VERDICT_COUNTS: &str = "COUNT(*) AS total, \
     COALESCE(SUM(CASE WHEN t.overall_status = 'PASS' THEN 1 ELSE 0 END), 0) AS passed, \
     COALESCE(SUM(CASE WHEN t.overall_status = 'FAIL' THEN 1 ELSE 0 END), 0) AS failed, \
     COALESCE(SUM(CASE WHEN t.overall_status = 'INVALID' THEN 1 ELSE 0 END), 0) AS invalid";

/// Percentage of passed tests among all tests, one decimal; 0 when empty
pub fn pass_rate(passed: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (passed as f64 * 1000.0 / total as f64).round() / 10.0
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    total: i64,
    passed: i64,
    failed: i64,
    invalid: i64,
    inverters: i64,
    annotated_failures: i64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub invalid: i64,
    pub pass_rate: f64,
    pub distinct_inverters: i64,
    pub annotated_failures: i64,
}

/// GET /api/stats/summary
pub async fn summary(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<SummaryResponse>> {
    let status = filter.validated_status()?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
    qb.push(VERDICT_COUNTS);
    qb.push(
        ", COUNT(DISTINCT t.inverter_id) AS inverters, \
         COALESCE(SUM(CASE WHEN t.overall_status = 'FAIL' AND EXISTS \
         (SELECT 1 FROM test_annotations a WHERE a.test_id = t.id) THEN 1 ELSE 0 END), 0) \
         AS annotated_failures",
    );
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, status);

    let row = qb.build_query_as::<SummaryRow>().fetch_one(&state.db).await?;

    Ok(Json(SummaryResponse {
        total_tests: row.total,
        passed: row.passed,
        failed: row.failed,
        invalid: row.invalid,
        pass_rate: pass_rate(row.passed, row.total),
        distinct_inverters: row.inverters,
        annotated_failures: row.annotated_failures,
    }))
}

#[derive(Debug, Serialize, FromRow)]
pub struct DailyCount {
    pub day: String,
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub invalid: i64,
}

/// GET /api/stats/daily
pub async fn daily(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<Vec<DailyCount>>> {
    let status = filter.validated_status()?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT date(t.start_time) AS day, ");
    qb.push(VERDICT_COUNTS);
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, status);
    qb.push(" GROUP BY day ORDER BY day");

    Ok(Json(qb.build_query_as::<DailyCount>().fetch_all(&state.db).await?))
}

#[derive(Debug, FromRow)]
struct FirmwareRow {
    firmware_version: String,
    total: i64,
    passed: i64,
    failed: i64,
    invalid: i64,
}

#[derive(Debug, Serialize)]
pub struct FirmwareStats {
    pub firmware_version: String,
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub invalid: i64,
    pub pass_rate: f64,
}

/// GET /api/stats/firmware
pub async fn firmware(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<Vec<FirmwareStats>>> {
    let status = filter.validated_status()?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT COALESCE(NULLIF(TRIM(t.firmware_version), ''), 'unknown') AS firmware_version, ",
    );
    qb.push(VERDICT_COUNTS);
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, status);
    qb.push(" GROUP BY 1 ORDER BY total DESC, firmware_version");

    let rows = qb.build_query_as::<FirmwareRow>().fetch_all(&state.db).await?;

    Ok(Json(
        rows.into_iter()
            .map(|r| FirmwareStats {
                pass_rate: pass_rate(r.passed, r.total),
                firmware_version: r.firmware_version,
                total: r.total,
                passed: r.passed,
                failed: r.failed,
                invalid: r.invalid,
            })
            .collect(),
    ))
}

/// Build statistics routes
pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stats/summary", get(summary))
        .route("/api/stats/daily", get(daily))
        .route("/api/stats/firmware", get(firmware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_rate() {
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(3, 4), 75.0);
        assert_eq!(pass_rate(1, 3), 33.3);
        assert_eq!(pass_rate(2, 2), 100.0);
    }
}
