//! Ingestion of queued results and telemetry files
//!
//! For every results file in `to_process/results`:
//! 1. read its rows (an unreadable file stays queued)
//! 2. per row: drop debug firmware (deleting its queued telemetry), skip runs
//!    already stored, locate the telemetry file, then insert the inverter,
//!    test and samples in one transaction (a failing row is logged and skipped)
//! 3. move the results file and every queued telemetry file it matched to `processed/`

use crate::csv_files::{read_results_file, read_telemetry_file, ResultsRow, TelemetrySample};
use crate::intake::move_into;
use crate::matcher::{list_csv_files, MatchKind, TelemetryMatch, TelemetryMatcher};
use burnin_common::config::IntakeDirs;
use burnin_common::naming::parse_results_filename;
use burnin_common::{is_debug_firmware, Error, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// SQLite's default bound-parameter limit per statement
const SQLITE_MAX_VARIABLES: usize = 32_766;

/// Parameters bound per telemetry row (test_id, timestamp, readings)
const SAMPLE_BINDS: usize = 3;

/// Largest batch whose INSERT stays within the parameter limit
pub const MAX_BATCH_SIZE: usize = SQLITE_MAX_VARIABLES / SAMPLE_BINDS;

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files_processed: usize,
    pub files_failed: usize,
    pub tests_inserted: usize,
    pub samples_inserted: usize,
    pub tests_without_telemetry: usize,
    pub rows_skipped_debug: usize,
    /// Queued telemetry files of debug runs, deleted
    pub debug_telemetry_removed: usize,
    pub rows_skipped_duplicate: usize,
    pub rows_skipped_invalid: usize,
    pub rows_failed: usize,
}

#[derive(Debug)]
enum RowOutcome {
    Inserted {
        test_id: i64,
        samples: usize,
        telemetry: Option<PathBuf>,
    },
    /// Debug run; carries its queued telemetry file, if any
    DebugFirmware { telemetry: Option<PathBuf> },
    /// Already stored; carries its queued telemetry file, if any
    Duplicate { telemetry: Option<PathBuf> },
    Invalid(&'static str),
}

/// Loads queued files into the database
#[derive(Debug, Clone)]
pub struct Ingester {
    db: SqlitePool,
    dirs: IntakeDirs,
    matcher: TelemetryMatcher,
    /// Searches `to_process/tests` only
    queued: TelemetryMatcher,
    batch_size: usize,
}

impl Ingester {
    /// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`
    pub fn new(db: SqlitePool, dirs: IntakeDirs, batch_size: usize) -> Self {
        let matcher = TelemetryMatcher::new(vec![
            dirs.to_process_tests.clone(),
            dirs.processed_tests.clone(),
        ]);
        let queued = TelemetryMatcher::new(vec![dirs.to_process_tests.clone()]);

        let effective = batch_size.clamp(1, MAX_BATCH_SIZE);
        if effective != batch_size {
            warn!(requested = batch_size, using = effective, "batch_size out of range, clamped");
        }

        Self {
            db,
            dirs,
            matcher,
            queued,
            batch_size: effective,
        }
    }

    /// Telemetry rows per INSERT statement
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Process every queued results file
    pub async fn run(&self) -> Result<IngestReport> {
        self.dirs.ensure_exist()?;
        let files = list_csv_files(&self.dirs.to_process_results)?;
        info!("Ingesting {} queued results file(s)", files.len());

        let mut report = IngestReport::default();
        for name in files {
            let path = self.dirs.to_process_results.join(&name);
            match self.ingest_results_file(&path, &mut report).await {
                Ok(consumed) => {
                    self.retire_files(&path, &consumed)?;
                    report.files_processed += 1;
                }
                Err(e) => {
                    error!(file = %name, "Failed to process results file, leaving it queued: {}", e);
                    report.files_failed += 1;
                }
            }
        }

        info!(
            files = report.files_processed,
            failed_files = report.files_failed,
            tests = report.tests_inserted,
            samples = report.samples_inserted,
            debug_rows = report.rows_skipped_debug,
            debug_telemetry_removed = report.debug_telemetry_removed,
            duplicate_rows = report.rows_skipped_duplicate,
            invalid_rows = report.rows_skipped_invalid,
            failed_rows = report.rows_failed,
            "Ingestion finished"
        );

        Ok(report)
    }

    /// Ingest the rows of one results file, returning the queued telemetry files matched
    async fn ingest_results_file(
        &self,
        path: &Path,
        report: &mut IngestReport,
    ) -> Result<BTreeSet<PathBuf>> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_time = parse_results_filename(&file_name).map(|(_, ts)| ts);
        if file_time.is_none() {
            warn!(file = %file_name, "Results file name does not follow <SN>_<date>_<time>.csv");
        }

        let rows = read_results_file(path)?;
        let mut consumed = BTreeSet::new();

        for row in &rows {
            match self.ingest_row(row, &file_name, file_time).await {
                Ok(RowOutcome::Inserted {
                    test_id,
                    samples,
                    telemetry,
                }) => {
                    debug!(file = %file_name, row = row.row_number, test_id, samples, "Inserted test");
                    report.tests_inserted += 1;
                    report.samples_inserted += samples;
                    match telemetry {
                        Some(t) => {
                            consumed.insert(t);
                        }
                        None => report.tests_without_telemetry += 1,
                    }
                }
                Ok(RowOutcome::DebugFirmware { telemetry }) => {
                    debug!(file = %file_name, row = row.row_number, "Skipping debug firmware row");
                    report.rows_skipped_debug += 1;
                    // Removed now so no later row can pick it up by prefix
                    if let Some(path) = telemetry {
                        std::fs::remove_file(&path)?;
                        info!(file = %path.display(), "Deleted debug firmware telemetry");
                        report.debug_telemetry_removed += 1;
                    }
                }
                Ok(RowOutcome::Duplicate { telemetry }) => {
                    debug!(file = %file_name, row = row.row_number, "Test already ingested");
                    report.rows_skipped_duplicate += 1;
                    if let Some(path) = telemetry {
                        consumed.insert(path);
                    }
                }
                Ok(RowOutcome::Invalid(reason)) => {
                    warn!(file = %file_name, row = row.row_number, "Skipping row: {}", reason);
                    report.rows_skipped_invalid += 1;
                }
                Err(e) => {
                    error!(file = %file_name, row = row.row_number, "Failed to ingest row: {}", e);
                    report.rows_failed += 1;
                }
            }
        }

        Ok(consumed)
    }

    async fn ingest_row(
        &self,
        row: &ResultsRow,
        results_file: &str,
        file_time: Option<NaiveDateTime>,
    ) -> Result<RowOutcome> {
        let serial = row.serial_number.as_deref();
        let start = row.start_time.or(file_time);

        if row.firmware_version.as_deref().is_some_and(is_debug_firmware) {
            let telemetry = match (serial, start) {
                (Some(serial), Some(start)) => self
                    .queued
                    .find(serial, start, reference_time(row, file_time, start))?
                    .map(|found| found.path),
                _ => None,
            };
            return Ok(RowOutcome::DebugFirmware { telemetry });
        }
        let Some(serial) = serial else {
            return Ok(RowOutcome::Invalid("missing serial number"));
        };
        let Some(start) = start else {
            return Ok(RowOutcome::Invalid("missing start time"));
        };
        let reference = reference_time(row, file_time, start);

        if test_exists(&self.db, serial, start).await? {
            let telemetry = self
                .queued
                .find(serial, start, reference)?
                .map(|found| found.path);
            return Ok(RowOutcome::Duplicate { telemetry });
        }

        let telemetry = self.load_telemetry(serial, start, reference).await?;
        let (data_file, samples): (Option<&Path>, &[TelemetrySample]) = match &telemetry {
            Some((path, samples)) => (Some(path.as_path()), samples.as_slice()),
            None => (None, &[]),
        };

        let mut tx = self.db.begin().await?;
        let inverter_id = upsert_inverter(&mut *tx, serial).await?;
        let test_id = insert_test(&mut *tx, inverter_id, start, row, results_file, data_file).await?;
        let inserted = insert_samples(&mut *tx, test_id, samples, self.batch_size).await?;
        tx.commit().await?;

        Ok(RowOutcome::Inserted {
            test_id,
            samples: inserted,
            telemetry: telemetry.map(|(path, _)| path),
        })
    }

    /// Locate and parse the telemetry file; problems degrade to "no telemetry"
    ///
    /// A prefix match already recorded against another test is not reused.
    async fn load_telemetry(
        &self,
        serial: &str,
        start: NaiveDateTime,
        reference: NaiveDateTime,
    ) -> Result<Option<(PathBuf, Vec<TelemetrySample>)>> {
        let Some(found) = self.matcher.find(serial, start, reference)? else {
            warn!(serial, %start, "No telemetry file found; ingesting results only");
            return Ok(None);
        };

        if found.kind == MatchKind::Prefix {
            if data_file_claimed(&self.db, &found).await? {
                warn!(
                    serial,
                    %start,
                    file = %found.file_name(),
                    "Nearest telemetry belongs to another test; ingesting results only"
                );
                return Ok(None);
            }
            info!(serial, %start, file = %found.file_name(), "Telemetry matched by prefix scan");
        }

        match read_telemetry_file(&found.path) {
            Ok(file) => {
                if file.skipped_rows > 0 {
                    warn!(
                        file = %found.file_name(),
                        skipped = file.skipped_rows,
                        "Telemetry rows with unparseable timestamps were dropped"
                    );
                }
                Ok(Some((found.path, file.samples)))
            }
            Err(e) => {
                warn!(file = %found.file_name(), "Unreadable telemetry file, ingesting results only: {}", e);
                Ok(None)
            }
        }
    }

    /// Move the results file and the queued telemetry it used to `processed/`
    fn retire_files(&self, results_path: &Path, consumed: &BTreeSet<PathBuf>) -> Result<()> {
        move_into(results_path, &self.dirs.processed_results)?;
        for telemetry in consumed {
            if telemetry.starts_with(&self.dirs.to_process_tests) && telemetry.exists() {
                move_into(telemetry, &self.dirs.processed_tests)?;
            }
        }
        Ok(())
    }
}

/// Prefix scans bound telemetry by the results file time when known
fn reference_time(
    row: &ResultsRow,
    file_time: Option<NaiveDateTime>,
    start: NaiveDateTime,
) -> NaiveDateTime {
    file_time.or(row.end_time).unwrap_or(start).max(start)
}

/// True when a stored test already references this telemetry file
async fn data_file_claimed(db: &SqlitePool, found: &TelemetryMatch) -> Result<bool> {
    let claimed: Option<i64> = sqlx::query_scalar("SELECT id FROM tests WHERE data_file = ? LIMIT 1")
        .bind(found.file_name())
        .fetch_optional(db)
        .await?;
    Ok(claimed.is_some())
}

/// True when a test for this inverter and start time is already stored
pub async fn test_exists(db: &SqlitePool, serial: &str, start: NaiveDateTime) -> Result<bool> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT t.id FROM tests t
         JOIN inverters i ON i.id = t.inverter_id
         WHERE i.serial_number = ? AND t.start_time = ?",
    )
    .bind(serial)
    .bind(start)
    .fetch_optional(db)
    .await?;
    Ok(existing.is_some())
}

/// Id of the inverter with this serial number, creating it if needed
pub async fn upsert_inverter(conn: &mut SqliteConnection, serial: &str) -> Result<i64> {
    sqlx::query("INSERT INTO inverters (serial_number) VALUES (?) ON CONFLICT(serial_number) DO NOTHING")
        .bind(serial)
        .execute(&mut *conn)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM inverters WHERE serial_number = ?")
        .bind(serial)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn insert_test(
    conn: &mut SqliteConnection,
    inverter_id: i64,
    start: NaiveDateTime,
    row: &ResultsRow,
    results_file: &str,
    data_file: Option<&Path>,
) -> Result<i64> {
    let channel_status = serde_json::to_string(&row.channel_status)
        .map_err(|e| Error::Internal(format!("Cannot encode channel status: {}", e)))?;
    let data_file = data_file
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());

    let result = sqlx::query(
        r#"
        INSERT INTO tests (
            inverter_id, start_time, end_time, firmware_version, channel_status,
            overall_status, failure_description, results_file, data_file
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(inverter_id)
    .bind(start)
    .bind(row.end_time)
    .bind(row.firmware_version.as_deref())
    .bind(channel_status)
    .bind(row.overall_status)
    .bind(row.failure_description.as_deref())
    .bind(results_file)
    .bind(data_file)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert samples in sequential chunks of `batch_size` rows
async fn insert_samples(
    conn: &mut SqliteConnection,
    test_id: i64,
    samples: &[TelemetrySample],
    batch_size: usize,
) -> Result<usize> {
    let mut inserted = 0;

    for chunk in samples.chunks(batch_size) {
        let encoded = chunk
            .iter()
            .map(|s| serde_json::to_string(&s.readings).map(|json| (s.timestamp, json)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Internal(format!("Cannot encode readings: {}", e)))?;

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO test_data (test_id, timestamp, readings) ");
        builder.push_values(encoded, |mut b, (timestamp, readings)| {
            b.push_bind(test_id).push_bind(timestamp).push_bind(readings);
        });
        builder.build().execute(&mut *conn).await?;

        inserted += chunk.len();
    }

    Ok(inserted)
}
