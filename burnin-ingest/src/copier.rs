//! One-shot filtered copy
//!
//! Back-fills the intake directories from station folders, skipping results
//! recorded on or before a cutoff date and results produced by debug firmware.

use crate::csv_files::first_row_firmware;
use crate::intake::{queue_pair, QueueOutcome};
use crate::matcher::{list_csv_files, select_data_file, DataFileSelection, MATCH_WINDOW_DAYS};
use burnin_common::config::{IntakeDirs, SourceDirectory};
use burnin_common::naming::parse_results_filename;
use burnin_common::{is_debug_firmware, Error, Result, DEBUG_FIRMWARE};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters for one filtered copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub checked: usize,
    pub copied: usize,
    pub already_exist: usize,
    pub skipped_date: usize,
    pub skipped_firmware: usize,
    pub unparsed: usize,
    pub unmatched: usize,
}

pub struct FilteredCopier {
    dirs: IntakeDirs,
    cutoff: NaiveDateTime,
}

impl FilteredCopier {
    /// Results must be strictly newer than midnight of `cutoff_date`
    pub fn new(dirs: IntakeDirs, cutoff_date: NaiveDate) -> Self {
        Self {
            dirs,
            cutoff: cutoff_date.and_time(chrono::NaiveTime::MIN),
        }
    }

    /// Copy from every station and log a summary
    pub fn run(&self, sources: &[SourceDirectory]) -> Result<CopyReport> {
        info!("Starting filtered file copy (cutoff {})...", self.cutoff);
        self.dirs.ensure_exist()?;

        let mut report = CopyReport::default();
        for source in sources {
            self.copy_source(&source.results_dir, &source.data_dir, &mut report)?;
        }

        info!("Copy operation completed:");
        info!("  Total files checked: {}", report.checked);
        info!("  Files copied: {}", report.copied);
        info!("  Files already exist: {}", report.already_exist);
        info!("  Files skipped (date filter): {}", report.skipped_date);
        info!("  Files skipped (firmware filter): {}", report.skipped_firmware);
        info!("  Files not matched to telemetry: {}", report.unmatched);

        Ok(report)
    }

    /// Copy eligible pairs from one station
    pub fn copy_source(
        &self,
        results_dir: &Path,
        data_dir: &Path,
        report: &mut CopyReport,
    ) -> Result<()> {
        for dir in [results_dir, data_dir] {
            if !dir.exists() {
                return Err(Error::NotFound(format!("Directory does not exist: {}", dir.display())));
            }
        }

        let results_files = list_csv_files(results_dir)?;
        let data_files = list_csv_files(data_dir)?;
        info!("Found {} files in {}", results_files.len(), results_dir.display());

        for file in &results_files {
            report.checked += 1;

            if self.dirs.results_file_known(file) {
                report.already_exist += 1;
                continue;
            }

            let Some((serial, results_time)) = parse_results_filename(file) else {
                warn!("Could not parse results file: {}", file);
                report.unparsed += 1;
                continue;
            };

            if results_time <= self.cutoff {
                debug!("Skipping {} - date {} is not newer than {}", file, results_time, self.cutoff);
                report.skipped_date += 1;
                continue;
            }

            let results_path = results_dir.join(file);
            if self.has_debug_firmware(&results_path) {
                info!("Skipping {} - has excluded firmware version {}", file, DEBUG_FIRMWARE);
                report.skipped_firmware += 1;
                continue;
            }

            match select_data_file(data_files.iter().map(String::as_str), &serial, results_time, false) {
                DataFileSelection::Found { file_name, .. } => {
                    match queue_pair(&self.dirs, &results_path, data_dir, &file_name)? {
                        QueueOutcome::Both => info!("Copied {} and {}", file_name, file),
                        QueueOutcome::ResultsOnly => {
                            info!("Test file {} already exists, copied only {}", file_name, file)
                        }
                    }
                    report.copied += 1;
                }
                DataFileSelection::TooOld { file_name, .. } => {
                    warn!(
                        "Test file {} is more than {} days before results file {}; skipping",
                        file_name, MATCH_WINDOW_DAYS, file
                    );
                    report.unmatched += 1;
                }
                DataFileSelection::NotFound => {
                    warn!("No matching test file found for {}; skipping", file);
                    report.unmatched += 1;
                }
            }
        }

        Ok(())
    }

    /// Unreadable files are not excluded; ingestion re-checks every row
    fn has_debug_firmware(&self, path: &Path) -> bool {
        match first_row_firmware(path) {
            Ok(firmware) => firmware.as_deref().is_some_and(is_debug_firmware),
            Err(e) => {
                warn!("Could not check firmware version for {}: {}", path.display(), e);
                false
            }
        }
    }
}
