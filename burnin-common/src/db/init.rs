//! Database initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! Every statement is idempotent, so both binaries call this at startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Annotation groups seeded into a fresh database: (name, description, color)
pub const DEFAULT_ANNOTATION_GROUPS: &[(&str, &str, &str)] = &[
    ("Hardware", "Component or assembly defect on the unit", "#d9534f"),
    ("Firmware", "Behavior traced to inverter firmware", "#f0ad4e"),
    ("Test Setup", "Fixture, wiring or station problem", "#5bc0de"),
    ("Operator", "Procedure not followed", "#6f42c1"),
    ("Under Investigation", "Root cause not yet known", "#777777"),
];

/// Open (creating if needed) the database file and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets the dashboard keep reading while ingestion writes
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Each in-memory connection is its own database, so the pool is capped at one
/// connection that is never retired.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes, then seed the annotation taxonomy
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_settings_table(pool).await?;
    create_inverters_table(pool).await?;
    create_tests_table(pool).await?;
    create_test_data_table(pool).await?;
    create_annotation_groups_table(pool).await?;
    create_annotation_quick_options_table(pool).await?;
    create_test_annotations_table(pool).await?;

    seed_annotation_groups(pool).await?;

    Ok(())
}

/// Key-value application settings (session secret)
async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_inverters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inverters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            serial_number TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One burn-in run; unique per inverter and start time so re-ingestion is a no-op
async fn create_tests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            inverter_id INTEGER NOT NULL REFERENCES inverters(id) ON DELETE CASCADE,
            start_time TIMESTAMP NOT NULL,
            end_time TIMESTAMP,
            firmware_version TEXT,
            channel_status TEXT NOT NULL DEFAULT '{}',
            overall_status TEXT NOT NULL CHECK (overall_status IN ('PASS', 'FAIL', 'INVALID')),
            failure_description TEXT,
            results_file TEXT,
            data_file TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (inverter_id, start_time)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tests_start_time ON tests(start_time)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tests_status ON tests(overall_status)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_test_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            test_id INTEGER NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
            timestamp TIMESTAMP NOT NULL,
            readings TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_test_data_test_time ON test_data(test_id, timestamp)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_annotation_groups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            color TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_annotation_quick_options_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_quick_options (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            option_text TEXT NOT NULL UNIQUE,
            group_id INTEGER REFERENCES annotation_groups(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_test_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_annotations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            test_id INTEGER NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
            annotation_text TEXT NOT NULL,
            annotation_group TEXT,
            created_by TEXT NOT NULL,
            created_by_name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_test_annotations_test ON test_annotations(test_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_annotation_groups(pool: &SqlitePool) -> Result<()> {
    for (name, description, color) in DEFAULT_ANNOTATION_GROUPS {
        sqlx::query(
            "INSERT OR IGNORE INTO annotation_groups (name, description, color) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(color)
        .execute(pool)
        .await?;
    }

    Ok(())
}
