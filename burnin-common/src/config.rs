//! Configuration loading and intake directory layout
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `BURNIN_CONFIG` environment variable
//! 3. `~/.config/burnin/config.toml`, then `/etc/burnin/config.toml`
//! 4. Compiled defaults (a missing config file is never fatal)

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BURNIN_CONFIG";

/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "BURNIN_DATABASE";

/// Default telemetry rows per INSERT batch
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Full configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BurninConfig {
    pub paths: PathsConfig,
    pub settings: SettingsConfig,
    pub server: ServerConfig,
    pub copy_filter: CopyFilterConfig,
}

/// `[paths]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding `to_process/` and `processed/`
    pub main_dir: PathBuf,
    /// SQLite database file (defaults to `<main_dir>/burnin.db`)
    pub database: Option<PathBuf>,
    /// Directory for the log file; stderr only when unset
    pub log_dir: Option<PathBuf>,
    /// Test station output folders watched for new files
    pub source_directories: Vec<SourceDirectory>,
}

/// One test station's output folders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDirectory {
    pub name: String,
    pub results_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// `[settings]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Seconds between watchdog cycles
    pub check_interval: u64,
    /// Telemetry rows per INSERT batch
    pub batch_size: usize,
    /// Log file name inside `paths.log_dir`
    pub log_file: String,
    /// Default tracing level (RUST_LOG overrides)
    pub log_level: String,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

/// `[copy_filter]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyFilterConfig {
    /// Results older than or equal to this date are not copied
    pub cutoff_date: NaiveDate,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            main_dir: default_main_dir(),
            database: None,
            log_dir: None,
            source_directories: Vec::new(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            check_interval: 60,
            batch_size: DEFAULT_BATCH_SIZE,
            log_file: "burnin.log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
        }
    }
}

impl Default for CopyFilterConfig {
    fn default() -> Self {
        Self {
            cutoff_date: NaiveDate::from_ymd_opt(2025, 7, 11).unwrap_or_default(),
        }
    }
}

impl BurninConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration following the resolution priority order
    ///
    /// An explicitly named file (CLI or environment) must exist; the
    /// well-known locations are optional and fall back to defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_file(Path::new(&path));
        }

        match default_config_file() {
            Some(path) => Self::load_file(&path),
            None => {
                warn!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Database file path (`BURNIN_DATABASE` > `paths.database` > `<main_dir>/burnin.db`)
    pub fn database_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            return PathBuf::from(path);
        }
        self.paths
            .database
            .clone()
            .unwrap_or_else(|| self.paths.main_dir.join("burnin.db"))
    }

    /// Intake directory layout under `paths.main_dir`
    pub fn intake_dirs(&self) -> IntakeDirs {
        IntakeDirs::new(&self.paths.main_dir)
    }

    /// Full log file path, when file logging is configured
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.paths
            .log_dir
            .as_ref()
            .map(|dir| dir.join(&self.settings.log_file))
    }
}

/// `to_process/{results,tests}` and `processed/{results,tests}` under the main directory
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeDirs {
    pub to_process_results: PathBuf,
    pub to_process_tests: PathBuf,
    pub processed_results: PathBuf,
    pub processed_tests: PathBuf,
}

impl IntakeDirs {
    pub fn new(main_dir: &Path) -> Self {
        let to_process = main_dir.join("to_process");
        let processed = main_dir.join("processed");
        Self {
            to_process_results: to_process.join("results"),
            to_process_tests: to_process.join("tests"),
            processed_results: processed.join("results"),
            processed_tests: processed.join("tests"),
        }
    }

    /// Create all four directories if missing
    pub fn ensure_exist(&self) -> Result<()> {
        for dir in [
            &self.to_process_results,
            &self.to_process_tests,
            &self.processed_results,
            &self.processed_tests,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// True when a results file is already queued or ingested
    pub fn results_file_known(&self, file_name: &str) -> bool {
        self.to_process_results.join(file_name).exists()
            || self.processed_results.join(file_name).exists()
    }

    /// True when a telemetry file is already queued or ingested
    pub fn test_file_known(&self, file_name: &str) -> bool {
        self.to_process_tests.join(file_name).exists()
            || self.processed_tests.join(file_name).exists()
    }
}

/// First existing well-known config file for the platform
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("burnin").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/burnin/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default main directory
fn default_main_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("burnin"))
        .unwrap_or_else(|| PathBuf::from("./burnin_data"))
}
