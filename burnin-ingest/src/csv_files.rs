//! Results and telemetry CSV readers
//!
//! Both readers locate columns by header name, so stations that reorder or add
//! columns keep working. Cells are trimmed; short rows are tolerated.

use burnin_common::db::OverallStatus;
use burnin_common::Result;
use chrono::{DateTime, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeMap;
use std::path::Path;

const SERIAL_HEADERS: &[&str] = &["inverter s/n", "serial number", "serial", "sn"];
const START_HEADERS: &[&str] = &["start time", "test start"];
const END_HEADERS: &[&str] = &["end time", "test end"];
const FIRMWARE_HEADERS: &[&str] = &["inverter firmware", "firmware", "firmware version"];
const VERDICT_HEADERS: &[&str] = &["result", "overall status", "status", "overall result"];
const FAILURE_HEADERS: &[&str] = &["failure description", "failure reason", "failure"];
const TIMESTAMP_HEADERS: &[&str] = &["timestamp", "time", "date time", "datetime"];

/// Column index of the firmware version when the header is not recognised
const FIRMWARE_FALLBACK_INDEX: usize = 3;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

/// One row of a results file
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsRow {
    /// 1-based data row number, for log messages
    pub row_number: usize,
    pub serial_number: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub firmware_version: Option<String>,
    pub overall_status: OverallStatus,
    pub failure_description: Option<String>,
    /// Channel name (header without the ` Status` suffix) to status string
    pub channel_status: BTreeMap<String, String>,
}

/// One telemetry sample
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: NaiveDateTime,
    pub readings: BTreeMap<String, f64>,
}

/// Parsed telemetry file
#[derive(Debug, Clone, Default)]
pub struct TelemetryFile {
    pub samples: Vec<TelemetrySample>,
    /// Rows dropped because the timestamp did not parse
    pub skipped_rows: usize,
}

/// Parse a timestamp cell in any of the formats stations have used
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_local());
    }

    // Unix epoch seconds
    value
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs > 1_000_000_000)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|ts| ts.naive_utc())
}

fn normalized(header: &str) -> String {
    header.trim().to_ascii_lowercase()
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&normalized(h).as_str()))
}

fn non_empty(record: &StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Column positions resolved from a results file header row
#[derive(Debug, Clone)]
struct ResultsColumns {
    serial: Option<usize>,
    start: Option<usize>,
    end: Option<usize>,
    firmware: Option<usize>,
    verdict: Option<usize>,
    failure: Option<usize>,
    channels: Vec<(usize, String)>,
}

impl ResultsColumns {
    fn from_headers(headers: &StringRecord) -> Self {
        let verdict = find_column(headers, VERDICT_HEADERS);
        let firmware = find_column(headers, FIRMWARE_HEADERS)
            .or_else(|| (headers.len() > FIRMWARE_FALLBACK_INDEX).then_some(FIRMWARE_FALLBACK_INDEX));

        let channels = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != verdict)
            .filter_map(|(i, h)| {
                let h = h.trim();
                let lower = h.to_ascii_lowercase();
                lower
                    .strip_suffix(" status")
                    .map(|_| (i, h[..h.len() - " status".len()].trim().to_string()))
            })
            .filter(|(_, name)| !name.is_empty())
            .collect();

        Self {
            serial: find_column(headers, SERIAL_HEADERS),
            start: find_column(headers, START_HEADERS),
            end: find_column(headers, END_HEADERS),
            firmware,
            verdict,
            failure: find_column(headers, FAILURE_HEADERS),
            channels,
        }
    }

    fn read_row(&self, row_number: usize, record: &StringRecord) -> ResultsRow {
        let channel_status = self
            .channels
            .iter()
            .filter_map(|(i, name)| {
                non_empty(record, Some(*i)).map(|status| (name.clone(), status))
            })
            .collect();

        ResultsRow {
            row_number,
            serial_number: non_empty(record, self.serial),
            start_time: non_empty(record, self.start).and_then(|v| parse_timestamp(&v)),
            end_time: non_empty(record, self.end).and_then(|v| parse_timestamp(&v)),
            firmware_version: non_empty(record, self.firmware),
            overall_status: OverallStatus::from_station_verdict(
                &non_empty(record, self.verdict).unwrap_or_default(),
            ),
            failure_description: non_empty(record, self.failure),
            channel_status,
        }
    }
}

fn reader_for(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?)
}

/// Read every data row of a results file
///
/// Blank rows are dropped. Rows are returned even when fields are missing;
/// the ingester decides what is fatal for a row.
pub fn read_results_file(path: &Path) -> Result<Vec<ResultsRow>> {
    let mut reader = reader_for(path)?;
    let columns = ResultsColumns::from_headers(reader.headers()?);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(columns.read_row(index + 1, &record));
    }

    Ok(rows)
}

/// Firmware version of the first data row, if any
///
/// Used by the filtered copy to reject debug files before they are queued.
pub fn first_row_firmware(path: &Path) -> Result<Option<String>> {
    let mut reader = reader_for(path)?;
    let columns = ResultsColumns::from_headers(reader.headers()?);

    match reader.records().next() {
        Some(record) => Ok(non_empty(&record?, columns.firmware)),
        None => Ok(None),
    }
}

/// Read a telemetry file into timestamped samples
///
/// The timestamp column is found by header name (first column otherwise);
/// every other cell that parses as a number becomes a reading.
pub fn read_telemetry_file(path: &Path) -> Result<TelemetryFile> {
    let mut reader = reader_for(path)?;
    let headers = reader.headers()?.clone();
    let time_index = find_column(&headers, TIMESTAMP_HEADERS).unwrap_or(0);

    let mut file = TelemetryFile::default();
    for record in reader.records() {
        let record = record?;
        let Some(timestamp) = record.get(time_index).and_then(parse_timestamp) else {
            file.skipped_rows += 1;
            continue;
        };

        let readings = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_index)
            .filter_map(|(i, name)| {
                record
                    .get(i)
                    .and_then(|cell| cell.trim().parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .map(|v| (name.trim().to_string(), v))
            })
            .collect();

        file.samples.push(TelemetrySample { timestamp, readings });
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn dt(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 20)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2025-07-20 10:11:12"), Some(dt(10, 11, 12)));
        assert_eq!(parse_timestamp("2025-07-20T10:11:12"), Some(dt(10, 11, 12)));
        assert_eq!(parse_timestamp("07/20/2025 10:11:12"), Some(dt(10, 11, 12)));
        assert_eq!(parse_timestamp("2025-07-20 10:11"), Some(dt(10, 11, 0)));
        assert_eq!(parse_timestamp("1753006272"), Some(dt(10, 11, 12)));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_results_by_header_name() {
        let file = csv_file(
            "Result,Inverter S/N,Start Time,End Time,Inverter Firmware,PV1 Status,PV2 Status,Failure Description\n\
             FAIL,SN100,2025-07-20 10:00:00,2025-07-20 22:00:00,2.3.1,OK,OVERTEMP,PV2 over temperature\n",
        );

        let rows = read_results_file(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.row_number, 1);
        assert_eq!(row.serial_number.as_deref(), Some("SN100"));
        assert_eq!(row.start_time, Some(dt(10, 0, 0)));
        assert_eq!(row.end_time, Some(dt(22, 0, 0)));
        assert_eq!(row.firmware_version.as_deref(), Some("2.3.1"));
        assert_eq!(row.overall_status, OverallStatus::Fail);
        assert_eq!(row.failure_description.as_deref(), Some("PV2 over temperature"));
        assert_eq!(row.channel_status.get("PV1").map(String::as_str), Some("OK"));
        assert_eq!(row.channel_status.get("PV2").map(String::as_str), Some("OVERTEMP"));
    }

    #[test]
    fn test_overall_status_column_not_a_channel() {
        let file = csv_file(
            "SN,Start Time,End Time,Firmware,Overall Status,Grid Status\n\
             SN1,2025-07-20 10:00:00,,1.0.0,PASS,OK\n",
        );

        let rows = read_results_file(file.path()).unwrap();
        assert_eq!(rows[0].overall_status, OverallStatus::Pass);
        assert_eq!(rows[0].channel_status.len(), 1);
        assert!(rows[0].channel_status.contains_key("Grid"));
        assert_eq!(rows[0].end_time, None);
    }

    #[test]
    fn test_blank_rows_skipped_and_missing_cells_tolerated() {
        let file = csv_file(
            "Inverter S/N,Start Time,End Time,Inverter Firmware,Result\n\
             ,,,,\n\
             SN2,2025-07-20 10:00:00\n",
        );

        let rows = read_results_file(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].serial_number.as_deref(), Some("SN2"));
        assert_eq!(rows[0].firmware_version, None);
        assert_eq!(rows[0].overall_status, OverallStatus::Invalid);
    }

    #[test]
    fn test_first_row_firmware_by_position() {
        // Unrecognised headers: column 3 is the firmware, as on the oldest stations
        let file = csv_file("a,b,c,d,e\nSN3,x,y,1.11.11,PASS\nSN3,x,y,2.0.0,PASS\n");
        assert_eq!(first_row_firmware(file.path()).unwrap().as_deref(), Some("1.11.11"));
    }

    #[test]
    fn test_first_row_firmware_empty_file() {
        let file = csv_file("Inverter S/N,Start Time,End Time,Inverter Firmware\n");
        assert_eq!(first_row_firmware(file.path()).unwrap(), None);
    }

    #[test]
    fn test_telemetry_samples() {
        let file = csv_file(
            "Timestamp,AC Power (W),DC Voltage (V),Mode\n\
             2025-07-20 10:00:00,1500.5,380.2,RUN\n\
             garbage,1,2,RUN\n\
             2025-07-20 10:00:10,1502,,RUN\n",
        );

        let telemetry = read_telemetry_file(file.path()).unwrap();
        assert_eq!(telemetry.samples.len(), 2);
        assert_eq!(telemetry.skipped_rows, 1);

        let first = &telemetry.samples[0];
        assert_eq!(first.timestamp, dt(10, 0, 0));
        assert_eq!(first.readings.get("AC Power (W)"), Some(&1500.5));
        assert_eq!(first.readings.get("DC Voltage (V)"), Some(&380.2));
        assert!(!first.readings.contains_key("Mode"));

        let second = &telemetry.samples[1];
        assert_eq!(second.readings.len(), 1);
    }
}
