//! Queueing source files into `to_process/` and retiring them to `processed/`

use burnin_common::config::IntakeDirs;
use burnin_common::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What was copied for one results file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Results file and its telemetry file
    Both,
    /// Telemetry was already queued or processed; only the results file
    ResultsOnly,
}

/// Copy a results file and its telemetry file into the intake directories
pub fn queue_pair(
    dirs: &IntakeDirs,
    results_path: &Path,
    data_dir: &Path,
    data_file_name: &str,
) -> Result<QueueOutcome> {
    let results_name = results_path
        .file_name()
        .ok_or_else(|| burnin_common::Error::InvalidInput(format!(
            "Not a file path: {}",
            results_path.display()
        )))?;

    let outcome = if dirs.test_file_known(data_file_name) {
        QueueOutcome::ResultsOnly
    } else {
        std::fs::copy(
            data_dir.join(data_file_name),
            dirs.to_process_tests.join(data_file_name),
        )?;
        QueueOutcome::Both
    };

    std::fs::copy(results_path, dirs.to_process_results.join(results_name))?;

    Ok(outcome)
}

/// Move a file into `dest_dir`, falling back to copy + delete across filesystems
pub fn move_into(path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        burnin_common::Error::InvalidInput(format!("Not a file path: {}", path.display()))
    })?;
    let dest = dest_dir.join(name);

    if std::fs::rename(path, &dest).is_err() {
        std::fs::copy(path, &dest)?;
        std::fs::remove_file(path)?;
    }

    debug!(from = %path.display(), to = %dest.display(), "Moved file");
    Ok(dest)
}
