//! Pairing results with telemetry files
//!
//! A results row names a serial number and a start time. Its telemetry file is
//! found by constructing the expected file name first; when the station clock
//! and the results row disagree, a prefix scan over the inverter's telemetry
//! files picks the latest one recorded before the reference time and within
//! the match window.

use burnin_common::naming::{expected_test_filenames, parse_test_filename, test_file_prefix};
use burnin_common::Result;
use chrono::{Duration, NaiveDateTime};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Telemetry may start at most this many days before its results file
pub const MATCH_WINDOW_DAYS: i64 = 3;

/// How a telemetry file was located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    /// File name constructed from serial number and start time
    Exact,
    /// Latest prefix-scan candidate within the window
    Prefix,
}

/// A located telemetry file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryMatch {
    pub path: PathBuf,
    pub kind: MatchKind,
}

impl TelemetryMatch {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of choosing a data file for a results timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFileSelection {
    /// Latest candidate, inside the window
    Found { file_name: String, timestamp: NaiveDateTime },
    /// Latest candidate exists but starts before the window
    TooOld { file_name: String, timestamp: NaiveDateTime },
    /// No telemetry file for this serial before the reference time
    NotFound,
}

/// Names of the regular `.csv` files directly inside `dir`, sorted
pub fn list_csv_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            burnin_common::Error::Io(std::io::Error::other(format!(
                "Cannot list {}: {}",
                dir.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".csv") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Pick the telemetry file for `serial` among `file_names`
///
/// Candidates must start at or before `reference` (strictly before when
/// `inclusive` is false); the latest wins and must be within the window.
pub fn select_data_file<'a>(
    file_names: impl IntoIterator<Item = &'a str>,
    serial: &str,
    reference: NaiveDateTime,
    inclusive: bool,
) -> DataFileSelection {
    let latest = file_names
        .into_iter()
        .filter_map(|name| parse_test_filename(name).map(|(sn, ts)| (name, sn, ts)))
        .filter(|(_, sn, ts)| {
            sn == serial && if inclusive { *ts <= reference } else { *ts < reference }
        })
        .max_by_key(|(_, _, ts)| *ts);

    match latest {
        None => DataFileSelection::NotFound,
        Some((name, _, timestamp)) => {
            if timestamp >= reference - Duration::days(MATCH_WINDOW_DAYS) {
                DataFileSelection::Found {
                    file_name: name.to_string(),
                    timestamp,
                }
            } else {
                DataFileSelection::TooOld {
                    file_name: name.to_string(),
                    timestamp,
                }
            }
        }
    }
}

/// Locates telemetry files for results rows across a list of directories
///
/// Directories are searched in order; the intake directory comes first so a
/// queued file wins over an already processed copy.
#[derive(Debug, Clone)]
pub struct TelemetryMatcher {
    dirs: Vec<PathBuf>,
}

impl TelemetryMatcher {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Find the telemetry file for a test
    ///
    /// `start` drives the exact-name lookup; `reference` bounds the prefix scan.
    pub fn find(
        &self,
        serial: &str,
        start: NaiveDateTime,
        reference: NaiveDateTime,
    ) -> Result<Option<TelemetryMatch>> {
        let expected = expected_test_filenames(serial, start);
        for dir in &self.dirs {
            for name in &expected {
                let path = dir.join(name);
                if path.is_file() {
                    return Ok(Some(TelemetryMatch {
                        path,
                        kind: MatchKind::Exact,
                    }));
                }
            }
        }

        let prefix = test_file_prefix(serial);
        for dir in &self.dirs {
            if !dir.is_dir() {
                continue;
            }
            let names = list_csv_files(dir)?;
            let candidates = names.iter().map(String::as_str).filter(|n| n.starts_with(&prefix));
            if let DataFileSelection::Found { file_name, .. } =
                select_data_file(candidates, serial, reference, true)
            {
                return Ok(Some(TelemetryMatch {
                    path: dir.join(file_name),
                    kind: MatchKind::Prefix,
                }));
            }
        }

        Ok(None)
    }
}
