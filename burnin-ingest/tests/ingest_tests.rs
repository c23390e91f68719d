//! End-to-end ingestion tests
//!
//! Station folders and the intake tree live in temp directories; the database
//! is in memory.

use burnin_common::config::{IntakeDirs, SourceDirectory};
use burnin_common::db::init_memory_database;
use burnin_ingest::{FilteredCopier, Ingester, Watchdog, MAX_BATCH_SIZE};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const RESULTS_HEADER: &str =
    "Inverter S/N,Start Time,End Time,Inverter Firmware,Result,PV1 Status,PV2 Status,Failure Description\n";

fn telemetry(rows: usize) -> String {
    let mut content = String::from("Timestamp,AC Power (W),DC Voltage (V)\n");
    for i in 0..rows {
        content.push_str(&format!("2025-07-20 10:00:{:02},{},380.0\n", i, 1500 + i));
    }
    content
}

/// One sample per second from 10:00:00
fn long_telemetry(rows: usize) -> String {
    let start = NaiveDate::from_ymd_opt(2025, 7, 20)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let mut content = String::from("Timestamp,AC Power (W)\n");
    for i in 0..rows {
        let ts = start + chrono::Duration::seconds(i as i64);
        content.push_str(&format!("{},{}\n", ts.format("%Y-%m-%d %H:%M:%S"), i));
    }
    content
}

fn station() -> (TempDir, SourceDirectory) {
    let station = TempDir::new().unwrap();
    let source = SourceDirectory {
        name: "Station A".to_string(),
        results_dir: station.path().join("results"),
        data_dir: station.path().join("data"),
    };
    std::fs::create_dir_all(&source.results_dir).unwrap();
    std::fs::create_dir_all(&source.data_dir).unwrap();
    (station, source)
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

async fn setup() -> (TempDir, IntakeDirs, SqlitePool) {
    let main = TempDir::new().unwrap();
    let dirs = IntakeDirs::new(main.path());
    dirs.ensure_exist().unwrap();
    let db = init_memory_database().await.unwrap();
    (main, dirs, db)
}

async fn count(db: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(db).await.unwrap()
}

#[tokio::test]
async fn test_ingest_pair_moves_files_and_excludes_debug() {
    let (_main, dirs, db) = setup().await;

    write(
        &dirs.to_process_results,
        "SN100_2025-07-20_22-00-00.csv",
        &format!(
            "{}SN100,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,FAIL,OK,OVERTEMP,PV2 over temperature\n\
             SN101,2025-07-20 11:00:00,2025-07-20 21:00:00,1.11.11,PASS,OK,OK,\n",
            RESULTS_HEADER
        ),
    );
    write(&dirs.to_process_tests, "inverter_SN100_2025-07-20_10-00-00.csv", &telemetry(5));

    let report = Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.tests_inserted, 1);
    assert_eq!(report.samples_inserted, 5);
    assert_eq!(report.rows_skipped_debug, 1);

    assert_eq!(count(&db, "SELECT COUNT(*) FROM tests").await, 1);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM tests WHERE firmware_version = '1.11.11'").await,
        0
    );
    assert_eq!(count(&db, "SELECT COUNT(*) FROM test_data").await, 5);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM inverters WHERE serial_number = 'SN101'").await,
        0,
        "Debug rows must not create inverters"
    );

    let status: String = sqlx::query_scalar("SELECT overall_status FROM tests")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(status, "FAIL");

    assert!(!dirs.to_process_results.join("SN100_2025-07-20_22-00-00.csv").exists());
    assert!(dirs.processed_results.join("SN100_2025-07-20_22-00-00.csv").exists());
    assert!(dirs.processed_tests.join("inverter_SN100_2025-07-20_10-00-00.csv").exists());
}

#[tokio::test]
async fn test_every_test_has_an_inverter() {
    let (_main, dirs, db) = setup().await;

    write(
        &dirs.to_process_results,
        "SN200_2025-07-21_09-00-00.csv",
        &format!(
            "{}SN200,2025-07-20 09:00:00,2025-07-21 09:00:00,2.3.1,PASS,OK,OK,\n\
             ,2025-07-20 09:30:00,2025-07-21 09:00:00,2.3.1,PASS,OK,OK,\n\
             SN201,2025-07-20 09:45:00,2025-07-21 09:00:00,2.3.1,INVALID,OK,OK,\n",
            RESULTS_HEADER
        ),
    );

    let report = Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    assert_eq!(report.tests_inserted, 2);
    assert_eq!(report.rows_skipped_invalid, 1, "Row without serial is skipped");
    assert_eq!(report.tests_without_telemetry, 2);

    let orphans = count(
        &db,
        "SELECT COUNT(*) FROM tests t LEFT JOIN inverters i ON i.id = t.inverter_id WHERE i.id IS NULL",
    )
    .await;
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_reingesting_same_run_is_skipped() {
    let (_main, dirs, db) = setup().await;
    let content = format!(
        "{}SN300,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n",
        RESULTS_HEADER
    );

    write(&dirs.to_process_results, "SN300_2025-07-20_22-00-00.csv", &content);
    Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    write(&dirs.to_process_results, "SN300_2025-07-20_22-00-00.csv", &content);
    let report = Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    assert_eq!(report.tests_inserted, 0);
    assert_eq!(report.rows_skipped_duplicate, 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM tests").await, 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM inverters").await, 1);
}

#[tokio::test]
async fn test_small_batches_insert_every_sample() {
    let (_main, dirs, db) = setup().await;

    write(
        &dirs.to_process_results,
        "SN400_2025-07-20_22-00-00.csv",
        &format!("{}SN400,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n", RESULTS_HEADER),
    );
    write(&dirs.to_process_tests, "inverter_SN400_2025-07-20_10-00-00.csv", &telemetry(7));

    let report = Ingester::new(db.clone(), dirs.clone(), 3).run().await.unwrap();

    assert_eq!(report.samples_inserted, 7);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM test_data").await, 7);
}

#[tokio::test]
async fn test_prefix_match_uses_processed_telemetry() {
    let (_main, dirs, db) = setup().await;

    // Telemetry started a minute before the recorded start time
    write(&dirs.processed_tests, "inverter_SN500_2025-07-20_09-59.csv", &telemetry(2));
    write(
        &dirs.to_process_results,
        "SN500_2025-07-20_22-00-00.csv",
        &format!("{}SN500,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n", RESULTS_HEADER),
    );

    let report = Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    assert_eq!(report.samples_inserted, 2);
    let data_file: Option<String> = sqlx::query_scalar("SELECT data_file FROM tests")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(data_file.as_deref(), Some("inverter_SN500_2025-07-20_09-59.csv"));
}

#[tokio::test]
async fn test_watchdog_cycle_queues_and_ingests() {
    let (_main, dirs, db) = setup().await;
    let station = TempDir::new().unwrap();
    let results_dir = station.path().join("results");
    let data_dir = station.path().join("data");
    std::fs::create_dir_all(&results_dir).unwrap();
    std::fs::create_dir_all(&data_dir).unwrap();

    write(
        &results_dir,
        "SN600_2025-07-20_22-00-00.csv",
        &format!("{}SN600,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n", RESULTS_HEADER),
    );
    write(&data_dir, "inverter_SN600_2025-07-20_10-00-00.csv", &telemetry(3));
    // Older run of the same unit, outside the 3 day window
    write(&data_dir, "inverter_SN600_2025-07-10_10-00-00.csv", &telemetry(1));

    let sources = vec![
        SourceDirectory {
            name: "Station A".to_string(),
            results_dir: results_dir.clone(),
            data_dir: data_dir.clone(),
        },
        SourceDirectory {
            name: "Offline".to_string(),
            results_dir: station.path().join("missing"),
            data_dir: station.path().join("missing"),
        },
    ];
    let ingester = Ingester::new(db.clone(), dirs.clone(), 500);
    let watchdog = Watchdog::new(sources, dirs.clone(), ingester, Duration::from_secs(60));

    let summary = watchdog.run_cycle().await.unwrap();
    assert_eq!(summary.files_copied, 1);
    let report = summary.ingest.unwrap();
    assert_eq!(report.tests_inserted, 1);
    assert_eq!(report.samples_inserted, 3);
    assert!(dirs.processed_tests.join("inverter_SN600_2025-07-20_10-00-00.csv").exists());
    assert!(!dirs.processed_tests.join("inverter_SN600_2025-07-10_10-00-00.csv").exists());

    // Source files stay put; second cycle finds nothing new
    assert!(results_dir.join("SN600_2025-07-20_22-00-00.csv").exists());
    let summary = watchdog.run_cycle().await.unwrap();
    assert_eq!(summary.files_copied, 0);
    assert!(summary.ingest.is_none());
}

#[tokio::test]
async fn test_filtered_copy_applies_cutoff_and_firmware() {
    let (_main, dirs, _db) = setup().await;
    let station = TempDir::new().unwrap();
    let results_dir = station.path().join("results");
    let data_dir = station.path().join("data");
    std::fs::create_dir_all(&results_dir).unwrap();
    std::fs::create_dir_all(&data_dir).unwrap();

    let row = |sn: &str, fw: &str| {
        format!("{}{},2025-07-20 10:00:00,2025-07-20 22:00:00,{},PASS,OK,OK,\n", RESULTS_HEADER, sn, fw)
    };

    // Eligible
    write(&results_dir, "SN700_2025-07-20_22-00-00.csv", &row("SN700", "2.3.1"));
    write(&data_dir, "inverter_SN700_2025-07-20_10-00-00.csv", &telemetry(1));
    // Before the cutoff
    write(&results_dir, "SN701_2025-07-01_22-00-00.csv", &row("SN701", "2.3.1"));
    write(&data_dir, "inverter_SN701_2025-07-01_10-00-00.csv", &telemetry(1));
    // Debug firmware
    write(&results_dir, "SN702_2025-07-20_22-00-00.csv", &row("SN702", "1.11.11"));
    write(&data_dir, "inverter_SN702_2025-07-20_10-00-00.csv", &telemetry(1));
    // Telemetry timestamp equal to results time is not strictly earlier
    write(&results_dir, "SN703_2025-07-20_22-00-00.csv", &row("SN703", "2.3.1"));
    write(&data_dir, "inverter_SN703_2025-07-20_22-00-00.csv", &telemetry(1));
    // Not a results file name
    write(&results_dir, "notes.csv", "hello\n");

    let copier = FilteredCopier::new(dirs.clone(), NaiveDate::from_ymd_opt(2025, 7, 11).unwrap());
    let sources = [SourceDirectory {
        name: "Station A".to_string(),
        results_dir,
        data_dir,
    }];
    let report = copier.run(&sources).unwrap();

    assert_eq!(report.checked, 5);
    assert_eq!(report.copied, 1);
    assert_eq!(report.skipped_date, 1);
    assert_eq!(report.skipped_firmware, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.unparsed, 1);
    assert!(dirs.to_process_results.join("SN700_2025-07-20_22-00-00.csv").exists());
    assert!(dirs.to_process_tests.join("inverter_SN700_2025-07-20_10-00-00.csv").exists());

    // Running again reports the copied file as already present
    let report = copier.run(&sources).unwrap();
    assert_eq!(report.already_exist, 1);
    assert_eq!(report.copied, 0);
}

#[tokio::test]
async fn test_debug_telemetry_never_reaches_a_later_run() {
    let (_main, dirs, db) = setup().await;
    let (_station, source) = station();

    write(
        &source.results_dir,
        "SN800_2025-07-20_22-00-00.csv",
        &format!("{}SN800,2025-07-20 10:00:00,2025-07-20 22:00:00,1.11.11,PASS,OK,OK,\n", RESULTS_HEADER),
    );
    write(&source.data_dir, "inverter_SN800_2025-07-20_10-00-00.csv", &telemetry(4));

    let ingester = Ingester::new(db.clone(), dirs.clone(), 500);
    let watchdog = Watchdog::new(vec![source.clone()], dirs.clone(), ingester.clone(), Duration::from_secs(60));

    let report = watchdog.run_cycle().await.unwrap().ingest.unwrap();
    assert_eq!(report.rows_skipped_debug, 1);
    assert_eq!(report.debug_telemetry_removed, 1);
    assert!(!dirs.to_process_tests.join("inverter_SN800_2025-07-20_10-00-00.csv").exists());
    assert!(!dirs.processed_tests.join("inverter_SN800_2025-07-20_10-00-00.csv").exists());

    // Next-day production run of the same unit without its own telemetry
    write(
        &dirs.to_process_results,
        "SN800_2025-07-21_22-00-00.csv",
        &format!(
            "{}SN800,2025-07-21 10:00:00,2025-07-21 22:00:00,2.0.0,FAIL,OK,OVERTEMP,PV2 over temperature\n",
            RESULTS_HEADER
        ),
    );
    let report = ingester.run().await.unwrap();

    assert_eq!(report.tests_inserted, 1);
    assert_eq!(report.samples_inserted, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM test_data").await, 0);
    let data_file: Option<String> = sqlx::query_scalar("SELECT data_file FROM tests")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(data_file, None);

    // The debug results file stays known, so the pair is not queued again
    let summary = watchdog.run_cycle().await.unwrap();
    assert_eq!(summary.files_copied, 0);
}

#[tokio::test]
async fn test_duplicate_row_retires_queued_telemetry() {
    let (_main, dirs, db) = setup().await;
    let results = format!(
        "{}SN810,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n",
        RESULTS_HEADER
    );

    write(&dirs.to_process_results, "SN810_2025-07-20_22-00-00.csv", &results);
    write(&dirs.to_process_tests, "inverter_SN810_2025-07-20_10-00-00.csv", &telemetry(2));
    Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    // Same pair queued again by hand
    write(&dirs.to_process_results, "SN810_2025-07-20_22-00-00.csv", &results);
    write(&dirs.to_process_tests, "inverter_SN810_2025-07-20_10-00-00.csv", &telemetry(2));
    let report = Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    assert_eq!(report.rows_skipped_duplicate, 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM test_data").await, 2);
    assert!(list(&dirs.to_process_tests).is_empty());
    assert!(dirs.processed_tests.join("inverter_SN810_2025-07-20_10-00-00.csv").exists());
}

#[tokio::test]
async fn test_prefix_match_skips_telemetry_of_another_test() {
    let (_main, dirs, db) = setup().await;

    write(
        &dirs.to_process_results,
        "SN820_2025-07-20_22-00-00.csv",
        &format!("{}SN820,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n", RESULTS_HEADER),
    );
    write(&dirs.to_process_tests, "inverter_SN820_2025-07-20_10-00-00.csv", &telemetry(3));
    write(
        &dirs.to_process_results,
        "SN820_2025-07-21_22-00-00.csv",
        &format!("{}SN820,2025-07-21 10:00:00,2025-07-21 22:00:00,2.3.1,FAIL,OK,OK,\n", RESULTS_HEADER),
    );

    let report = Ingester::new(db.clone(), dirs.clone(), 500).run().await.unwrap();

    assert_eq!(report.tests_inserted, 2);
    assert_eq!(report.samples_inserted, 3);
    assert_eq!(report.tests_without_telemetry, 1);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM tests WHERE data_file IS NOT NULL").await,
        1
    );
}

#[tokio::test]
async fn test_oversized_batch_size_is_clamped() {
    let (_main, dirs, db) = setup().await;

    write(
        &dirs.to_process_results,
        "SN830_2025-07-20_22-00-00.csv",
        &format!("{}SN830,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,PASS,OK,OK,\n", RESULTS_HEADER),
    );
    write(&dirs.to_process_tests, "inverter_SN830_2025-07-20_10-00-00.csv", &long_telemetry(12_000));

    let ingester = Ingester::new(db.clone(), dirs.clone(), 20_000);
    assert_eq!(ingester.batch_size(), MAX_BATCH_SIZE);
    assert_eq!(Ingester::new(db.clone(), dirs.clone(), 0).batch_size(), 1);

    let report = ingester.run().await.unwrap();

    assert_eq!(report.rows_failed, 0);
    assert_eq!(report.tests_inserted, 1);
    assert_eq!(report.samples_inserted, 12_000);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM test_data").await, 12_000);
}

fn list(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}
