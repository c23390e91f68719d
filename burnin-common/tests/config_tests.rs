//! Configuration resolution tests
//!
//! Uses serial_test: these tests manipulate BURNIN_CONFIG / BURNIN_DATABASE
//! and must not run in parallel with each other.

use burnin_common::config::{BurninConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR};
use burnin_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_has_priority_over_env() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "[settings]\ncheck_interval = 5\n");

    let other = TempDir::new().unwrap();
    let env_path = write_config(&other, "[settings]\ncheck_interval = 99\n");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let config = BurninConfig::load(Some(&cli)).unwrap();
    assert_eq!(config.settings.check_interval, 5);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    let dir = TempDir::new().unwrap();
    let env_path = write_config(&dir, "[server]\nbind = \"0.0.0.0:8080\"\n");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let config = BurninConfig::load(None).unwrap();
    assert_eq!(config.server.bind, "0.0.0.0:8080");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = BurninConfig::load(Some(std::path::Path::new("/nonexistent/burnin.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_database_path_resolution() {
    env::remove_var(DATABASE_ENV_VAR);

    let mut config = BurninConfig::default();
    config.paths.main_dir = PathBuf::from("/srv/burnin");
    assert_eq!(config.database_path(), PathBuf::from("/srv/burnin/burnin.db"));

    config.paths.database = Some(PathBuf::from("/db/custom.db"));
    assert_eq!(config.database_path(), PathBuf::from("/db/custom.db"));

    env::set_var(DATABASE_ENV_VAR, "/tmp/override.db");
    assert_eq!(config.database_path(), PathBuf::from("/tmp/override.db"));
    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
fn test_intake_dirs_created() {
    let dir = TempDir::new().unwrap();
    let mut config = BurninConfig::default();
    config.paths.main_dir = dir.path().to_path_buf();

    let intake = config.intake_dirs();
    intake.ensure_exist().unwrap();

    assert!(intake.to_process_results.is_dir());
    assert!(intake.to_process_tests.is_dir());
    assert!(intake.processed_results.is_dir());
    assert!(intake.processed_tests.is_dir());

    std::fs::write(intake.processed_results.join("A_2025-07-20_10-00-00.csv"), "x").unwrap();
    assert!(intake.results_file_known("A_2025-07-20_10-00-00.csv"));
    assert!(!intake.test_file_known("inverter_A_2025-07-20_10-00-00.csv"));
}
