//! Database initialization tests
//!
//! - fresh database file is created with the full schema
//! - reopening an existing database is idempotent
//! - foreign keys keep tests tied to inverters

use burnin_common::auth::{load_session_secret, store_session_secret};
use burnin_common::db::{
    init_database, init_memory_database, OverallStatus, TestRecord, DEFAULT_ANNOTATION_GROUPS,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("burnin.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_reopen_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("burnin.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.unwrap();
    let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotation_groups")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(groups as usize, DEFAULT_ANNOTATION_GROUPS.len());
}

#[tokio::test]
async fn test_all_tables_exist() {
    let pool = init_memory_database().await.unwrap();

    for table in [
        "settings",
        "inverters",
        "tests",
        "test_data",
        "test_annotations",
        "annotation_groups",
        "annotation_quick_options",
    ] {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert_eq!(found.as_deref(), Some(table));
    }
}

#[tokio::test]
async fn test_test_requires_existing_inverter() {
    let pool = init_memory_database().await.unwrap();

    let result = sqlx::query(
        "INSERT INTO tests (inverter_id, start_time, overall_status) VALUES (999, '2025-07-20 10:00:00', 'PASS')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "Orphan test row should violate the foreign key");
}

#[tokio::test]
async fn test_overall_status_constrained() {
    let pool = init_memory_database().await.unwrap();
    sqlx::query("INSERT INTO inverters (serial_number) VALUES ('SN1')")
        .execute(&pool)
        .await
        .unwrap();

    let result = sqlx::query(
        "INSERT INTO tests (inverter_id, start_time, overall_status) VALUES (1, '2025-07-20 10:00:00', 'MAYBE')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_session_secret_generated_once() {
    let pool = init_memory_database().await.unwrap();

    let first = load_session_secret(&pool).await.unwrap();
    assert_ne!(first, 0);
    let second = load_session_secret(&pool).await.unwrap();
    assert_eq!(first, second);

    store_session_secret(&pool, 0).await.unwrap();
    assert_eq!(load_session_secret(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_overall_status_decodes_as_enum() {
    let pool = init_memory_database().await.unwrap();
    sqlx::query("INSERT INTO inverters (serial_number) VALUES ('SN1')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO tests (inverter_id, start_time, overall_status) VALUES (1, '2025-07-20 10:00:00', ?)",
    )
    .bind(OverallStatus::Invalid)
    .execute(&pool)
    .await
    .unwrap();

    let stored: String = sqlx::query_scalar("SELECT overall_status FROM tests")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, "INVALID");

    let record: TestRecord = sqlx::query_as(
        "SELECT t.id, t.inverter_id, i.serial_number, t.start_time, t.end_time, \
         t.firmware_version, t.channel_status, t.overall_status, t.failure_description, \
         t.results_file, t.data_file, t.created_at \
         FROM tests t JOIN inverters i ON i.id = t.inverter_id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(record.overall_status, OverallStatus::Invalid);
}
