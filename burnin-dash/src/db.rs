//! Queries shared by several handlers

use burnin_common::db::{OverallStatus, TestAnnotation, TestDataPoint, TestRecord};
use burnin_common::firmware::EXCLUDE_DEBUG_SQL;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::filters::{TestFilter, TESTS_FROM};

/// One row of the test list
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TestSummary {
    pub id: i64,
    pub serial_number: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub firmware_version: Option<String>,
    pub overall_status: OverallStatus,
    pub failure_description: Option<String>,
    pub annotation_count: i64,
}

const SUMMARY_COLUMNS: &str = "SELECT t.id, i.serial_number, t.start_time, t.end_time, \
     t.firmware_version, t.overall_status, t.failure_description, \
     (SELECT COUNT(*) FROM test_annotations a WHERE a.test_id = t.id) AS annotation_count";

/// Number of non-debug tests matching the filter
pub async fn count_tests(
    db: &SqlitePool,
    filter: &TestFilter,
    status: Option<OverallStatus>,
) -> ApiResult<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, status);
    Ok(qb.build_query_scalar::<i64>().fetch_one(db).await?)
}

/// Matching tests, newest first; `page` is `(limit, offset)`, `None` for all
pub async fn list_tests(
    db: &SqlitePool,
    filter: &TestFilter,
    status: Option<OverallStatus>,
    page: Option<(i64, i64)>,
) -> ApiResult<Vec<TestSummary>> {
    let mut qb = QueryBuilder::<Sqlite>::new(SUMMARY_COLUMNS);
    qb.push(TESTS_FROM);
    filter.push_where(&mut qb, status);
    qb.push(" ORDER BY t.start_time DESC, t.id DESC");
    if let Some((limit, offset)) = page {
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
    }
    Ok(qb.build_query_as::<TestSummary>().fetch_all(db).await?)
}

/// All tests of one inverter, newest first
pub async fn list_inverter_tests(db: &SqlitePool, serial: &str) -> ApiResult<Vec<TestSummary>> {
    let sql = format!(
        "{}{} WHERE {} AND i.serial_number = ? ORDER BY t.start_time DESC, t.id DESC",
        SUMMARY_COLUMNS, TESTS_FROM, EXCLUDE_DEBUG_SQL
    );
    Ok(sqlx::query_as::<_, TestSummary>(&sql)
        .bind(serial)
        .fetch_all(db)
        .await?)
}

/// A visible test, or 404 (debug firmware tests are invisible)
pub async fn fetch_test(db: &SqlitePool, id: i64) -> ApiResult<TestRecord> {
    let sql = format!(
        "SELECT t.id, t.inverter_id, i.serial_number, t.start_time, t.end_time, \
         t.firmware_version, t.channel_status, t.overall_status, t.failure_description, \
         t.results_file, t.data_file, t.created_at{} WHERE t.id = ? AND {}",
        TESTS_FROM, EXCLUDE_DEBUG_SQL
    );
    sqlx::query_as::<_, TestRecord>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Test {} not found", id)))
}

/// Telemetry of one test in time order
pub async fn fetch_samples(db: &SqlitePool, test_id: i64) -> ApiResult<Vec<TestDataPoint>> {
    Ok(sqlx::query_as::<_, TestDataPoint>(
        "SELECT timestamp, readings FROM test_data WHERE test_id = ? ORDER BY timestamp, id",
    )
    .bind(test_id)
    .fetch_all(db)
    .await?)
}

pub async fn count_samples(db: &SqlitePool, test_id: i64) -> ApiResult<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM test_data WHERE test_id = ?")
        .bind(test_id)
        .fetch_one(db)
        .await?)
}

/// Annotations of one test, newest first
pub async fn fetch_annotations(db: &SqlitePool, test_id: i64) -> ApiResult<Vec<TestAnnotation>> {
    Ok(sqlx::query_as::<_, TestAnnotation>(
        "SELECT id, test_id, annotation_text, annotation_group, created_by, created_by_name, \
         created_at, updated_at FROM test_annotations WHERE test_id = ? \
         ORDER BY created_at DESC, id DESC",
    )
    .bind(test_id)
    .fetch_all(db)
    .await?)
}

pub async fn fetch_annotation(db: &SqlitePool, id: i64) -> ApiResult<TestAnnotation> {
    sqlx::query_as::<_, TestAnnotation>(
        "SELECT id, test_id, annotation_text, annotation_group, created_by, created_by_name, \
         created_at, updated_at FROM test_annotations WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Annotation {} not found", id)))
}
