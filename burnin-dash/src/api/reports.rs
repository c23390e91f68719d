//! CSV and zip report downloads

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use burnin_common::db::{OverallStatus, TestDataPoint};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use tracing::info;
use zip::write::SimpleFileOptions;

use crate::db::{self, TestSummary};
use crate::error::{ApiError, ApiResult};
use crate::filters::TestFilter;
use crate::AppState;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn csv_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(format!("CSV generation failed: {}", e))
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

/// Annotation texts per test, joined with " | "
async fn annotation_texts(pool: &SqlitePool, tests: &[TestSummary]) -> ApiResult<HashMap<i64, String>> {
    let mut texts = HashMap::new();
    for test in tests.iter().filter(|t| t.annotation_count > 0) {
        let annotations = db::fetch_annotations(pool, test.id).await?;
        let joined = annotations
            .iter()
            .rev()
            .map(|a| match &a.annotation_group {
                Some(group) => format!("[{}] {}", group, a.annotation_text),
                None => a.annotation_text.clone(),
            })
            .collect::<Vec<_>>()
            .join(" | ");
        texts.insert(test.id, joined);
    }
    Ok(texts)
}

/// Test list as CSV
pub fn tests_csv(tests: &[TestSummary], annotations: &HashMap<i64, String>) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "Test ID",
            "Serial Number",
            "Start Time",
            "End Time",
            "Firmware",
            "Result",
            "Failure Description",
            "Annotation Count",
            "Annotations",
        ])
        .map_err(csv_error)?;

    for test in tests {
        writer
            .write_record([
                test.id.to_string(),
                test.serial_number.clone(),
                test.start_time.format(TIMESTAMP_FORMAT).to_string(),
                test.end_time
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_default(),
                test.firmware_version.clone().unwrap_or_default(),
                test.overall_status.to_string(),
                test.failure_description.clone().unwrap_or_default(),
                test.annotation_count.to_string(),
                annotations.get(&test.id).cloned().unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }

    writer.into_inner().map_err(csv_error)
}

/// Telemetry as CSV: `Timestamp` then one column per reading name (sorted)
pub fn telemetry_csv(points: &[TestDataPoint]) -> ApiResult<Vec<u8>> {
    let fields: BTreeSet<&str> = points
        .iter()
        .flat_map(|p| p.readings.0.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(std::iter::once("Timestamp").chain(fields.iter().copied()))
        .map_err(csv_error)?;

    for point in points {
        let mut record = vec![point.timestamp.format(TIMESTAMP_FORMAT).to_string()];
        record.extend(fields.iter().map(|f| {
            point
                .readings
                .0
                .get(*f)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.into_inner().map_err(csv_error)
}

/// GET /api/reports/tests.csv
pub async fn tests_report(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Response> {
    let status = filter.validated_status()?;
    let tests = db::list_tests(&state.db, &filter, status, None).await?;
    let annotations = annotation_texts(&state.db, &tests).await?;
    let body = tests_csv(&tests, &annotations)?;

    info!(rows = tests.len(), "Generated tests.csv");
    Ok(attachment("text/csv; charset=utf-8", "burnin_tests.csv", body))
}

/// GET /api/reports/tests/:id/data.csv
pub async fn test_data_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let test = db::fetch_test(&state.db, id).await?;
    let points = db::fetch_samples(&state.db, id).await?;
    let body = telemetry_csv(&points)?;

    let file_name = data_file_name(&test.serial_number, test.start_time);
    Ok(attachment("text/csv; charset=utf-8", &file_name, body))
}

/// `<SN>_<YYYY-MM-DD_HH-MM-SS>.csv`
fn data_file_name(serial: &str, start: chrono::NaiveDateTime) -> String {
    format!("{}_{}.csv", serial, start.format("%Y-%m-%d_%H-%M-%S"))
}

/// GET /api/reports/failures.zip
///
/// `summary.csv` with every failed test plus `data/<SN>_<start>.csv` per test.
pub async fn failures_report(
    State(state): State<AppState>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Response> {
    filter.validated_status()?;
    let tests = db::list_tests(&state.db, &filter, Some(OverallStatus::Fail), None).await?;
    let annotations = annotation_texts(&state.db, &tests).await?;

    let zip_error = |e: zip::result::ZipError| ApiError::Internal(format!("Zip generation failed: {}", e));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file("summary.csv", options).map_err(zip_error)?;
    zip.write_all(&tests_csv(&tests, &annotations)?)
        .map_err(|e| ApiError::Internal(format!("Zip generation failed: {}", e)))?;

    for test in &tests {
        let points = db::fetch_samples(&state.db, test.id).await?;
        let name = format!("data/{}", data_file_name(&test.serial_number, test.start_time));
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(&telemetry_csv(&points)?)
            .map_err(|e| ApiError::Internal(format!("Zip generation failed: {}", e)))?;
    }

    let body = zip.finish().map_err(zip_error)?.into_inner();

    info!(tests = tests.len(), bytes = body.len(), "Generated failures.zip");
    Ok(attachment("application/zip", "burnin_failures.zip", body))
}

/// Build report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reports/tests.csv", get(tests_report))
        .route("/api/reports/tests/:id/data.csv", get(test_data_report))
        .route("/api/reports/failures.zip", get(failures_report))
}
