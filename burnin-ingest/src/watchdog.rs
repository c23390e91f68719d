//! Station folder watchdog
//!
//! Every `check_interval` seconds, scans each configured station for results
//! files that are neither queued nor processed, pairs each with its telemetry
//! file and queues both. When anything was queued, ingestion runs in-process.

use crate::ingest::{IngestReport, Ingester};
use crate::intake::{queue_pair, QueueOutcome};
use crate::matcher::{list_csv_files, select_data_file, DataFileSelection, MATCH_WINDOW_DAYS};
use burnin_common::config::{IntakeDirs, SourceDirectory};
use burnin_common::naming::parse_results_filename;
use burnin_common::Result;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Idle cycles between heartbeat log lines
const HEARTBEAT_EVERY: u64 = 10;

/// Result of one watchdog cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Results files seen across all stations
    pub results_seen: usize,
    /// Results files newly queued
    pub files_copied: usize,
    /// Ingestion report, when ingestion ran
    pub ingest: Option<IngestReport>,
}

pub struct Watchdog {
    sources: Vec<SourceDirectory>,
    dirs: IntakeDirs,
    ingester: Ingester,
    interval: Duration,
}

impl Watchdog {
    pub fn new(
        sources: Vec<SourceDirectory>,
        dirs: IntakeDirs,
        ingester: Ingester,
        interval: Duration,
    ) -> Self {
        Self {
            sources,
            dirs,
            ingester,
            interval,
        }
    }

    /// Queue new files from every station; per-station errors are logged
    pub fn scan_sources(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        for source in &self.sources {
            if let Err(e) = self.scan_source(source, &mut summary) {
                error!("[{}] Scan failed: {}", source.name, e);
            }
        }
        summary
    }

    fn scan_source(&self, source: &SourceDirectory, summary: &mut CycleSummary) -> Result<()> {
        if !source.results_dir.exists() {
            debug!(
                "Results directory does not exist for {}: {}",
                source.name,
                source.results_dir.display()
            );
            return Ok(());
        }
        if !source.data_dir.exists() {
            debug!(
                "Data directory does not exist for {}: {}",
                source.name,
                source.data_dir.display()
            );
            return Ok(());
        }

        let results_files = list_csv_files(&source.results_dir)?;
        summary.results_seen += results_files.len();
        debug!("Found {} files in {} results directory", results_files.len(), source.name);

        let data_files = list_csv_files(&source.data_dir)?;

        for file in &results_files {
            if self.dirs.results_file_known(file) {
                continue;
            }
            let Some((serial, results_time)) = parse_results_filename(file) else {
                debug!("[{}] Ignoring unrecognised results file {}", source.name, file);
                continue;
            };

            let selection = select_data_file(
                data_files.iter().map(String::as_str),
                &serial,
                results_time,
                true,
            );

            match selection {
                DataFileSelection::Found { file_name, .. } => {
                    let outcome = queue_pair(
                        &self.dirs,
                        &source.results_dir.join(file),
                        &source.data_dir,
                        &file_name,
                    )?;
                    match outcome {
                        QueueOutcome::Both => info!(
                            "[{}] Copied {} to {} and {} to {}",
                            source.name,
                            file_name,
                            self.dirs.to_process_tests.display(),
                            file,
                            self.dirs.to_process_results.display()
                        ),
                        QueueOutcome::ResultsOnly => info!(
                            "[{}] Test file {} already exists, copied only {} to {}",
                            source.name,
                            file_name,
                            file,
                            self.dirs.to_process_results.display()
                        ),
                    }
                    summary.files_copied += 1;
                }
                DataFileSelection::TooOld { file_name, .. } => warn!(
                    "[{}] Test file {} is more than {} days before results file {}; skipping",
                    source.name, file_name, MATCH_WINDOW_DAYS, file
                ),
                DataFileSelection::NotFound => warn!(
                    "[{}] No matching test file found for {}; skipping",
                    source.name, file
                ),
            }
        }

        Ok(())
    }

    /// One scan, followed by ingestion when new files were queued
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let mut summary = self.scan_sources();
        if summary.files_copied > 0 {
            info!("New files detected, running ingestion...");
            let report = self.ingester.run().await?;
            if report.files_failed > 0 {
                error!(
                    "{} results file(s) failed to ingest and remain in to_process",
                    report.files_failed
                );
            } else {
                info!("Successfully processed {} new files", summary.files_copied);
            }
            summary.ingest = Some(report);
        }
        Ok(summary)
    }

    /// Run cycles until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        info!("Watchdog started - monitoring for new files...");
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            debug!("Starting cycle {}", cycle);

            match self.run_cycle().await {
                Ok(summary) => self.log_cycle(cycle, &summary),
                Err(e) => error!("Error in cycle {}: {}", cycle, e),
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested, watchdog stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn log_cycle(&self, cycle: u64, summary: &CycleSummary) {
        if summary.files_copied > 0 {
            info!(
                "Cycle {}: Checked {} files across {} source directories, copied {} new files",
                cycle,
                summary.results_seen,
                self.sources.len(),
                summary.files_copied
            );
        } else if cycle % HEARTBEAT_EVERY == 0 {
            info!(
                "Cycle {}: Checked {} files across {} source directories, copied 0 new files (heartbeat)",
                cycle,
                summary.results_seen,
                self.sources.len()
            );
        } else {
            debug!("Cycle {}: No new files to copy", cycle);
        }
    }
}
