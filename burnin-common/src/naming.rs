//! Results and telemetry file naming rules
//!
//! Test stations write two kinds of files:
//! - results: `<SN>_<YYYY-MM-DD>_<HH-MM-SS>.csv` (older stations: `<HH-MM>`)
//! - telemetry: `inverter_<SN>_<YYYY-MM-DD>_<HH-MM-SS>.csv` (older: `<HH-MM>`)

use chrono::NaiveDateTime;

/// Prefix of every telemetry file name
pub const TEST_FILE_PREFIX: &str = "inverter_";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT_SECONDS: &str = "%H-%M-%S";
const TIME_FORMAT_MINUTES: &str = "%H-%M";

/// Parse a results file name into (serial number, timestamp)
///
/// # Examples
/// ```
/// use burnin_common::naming::parse_results_filename;
///
/// let (sn, t) = parse_results_filename("INV001_2025-07-20_14-30-05.csv").unwrap();
/// assert_eq!(sn, "INV001");
/// assert_eq!(t.to_string(), "2025-07-20 14:30:05");
///
/// assert!(parse_results_filename("notes.txt").is_none());
/// ```
pub fn parse_results_filename(file_name: &str) -> Option<(String, NaiveDateTime)> {
    let stem = file_name.strip_suffix(".csv")?;
    parse_stem(stem)
}

/// Parse a telemetry file name into (serial number, timestamp)
pub fn parse_test_filename(file_name: &str) -> Option<(String, NaiveDateTime)> {
    let stem = file_name
        .strip_prefix(TEST_FILE_PREFIX)?
        .strip_suffix(".csv")?;
    parse_stem(stem)
}

/// `<SN>_<date>_<time>`; the serial is the first field and may not contain `_`
fn parse_stem(stem: &str) -> Option<(String, NaiveDateTime)> {
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 3 || parts[0].is_empty() {
        return None;
    }
    let timestamp = parse_date_time(parts[1], parts[2])?;
    Some((parts[0].to_string(), timestamp))
}

fn parse_date_time(date: &str, time: &str) -> Option<NaiveDateTime> {
    if !is_digit_groups(date, &[4, 2, 2]) {
        return None;
    }

    let time_format = if is_digit_groups(time, &[2, 2, 2]) {
        TIME_FORMAT_SECONDS
    } else if is_digit_groups(time, &[2, 2]) {
        TIME_FORMAT_MINUTES
    } else {
        return None;
    };

    NaiveDateTime::parse_from_str(
        &format!("{} {}", date, time),
        &format!("{} {}", DATE_FORMAT, time_format),
    )
    .ok()
}

/// `-`-separated groups of ASCII digits with exact widths
fn is_digit_groups(s: &str, widths: &[usize]) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == widths.len()
        && groups
            .iter()
            .zip(widths)
            .all(|(g, w)| g.len() == *w && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Telemetry file name for a serial number and start time
pub fn format_test_filename(serial: &str, start: NaiveDateTime, with_seconds: bool) -> String {
    let time_format = if with_seconds {
        TIME_FORMAT_SECONDS
    } else {
        TIME_FORMAT_MINUTES
    };
    format!(
        "{}{}_{}.csv",
        TEST_FILE_PREFIX,
        serial,
        start.format(&format!("{}_{}", DATE_FORMAT, time_format))
    )
}

/// Candidate telemetry file names for a test start, newest naming scheme first
pub fn expected_test_filenames(serial: &str, start: NaiveDateTime) -> [String; 2] {
    [
        format_test_filename(serial, start, true),
        format_test_filename(serial, start, false),
    ]
}

/// Prefix shared by every telemetry file of one inverter
pub fn test_file_prefix(serial: &str) -> String {
    format!("{}{}_", TEST_FILE_PREFIX, serial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_results_with_seconds() {
        let parsed = parse_results_filename("SN12345_2025-07-20_08-15-42.csv");
        assert_eq!(parsed, Some(("SN12345".to_string(), dt(2025, 7, 20, 8, 15, 42))));
    }

    #[test]
    fn test_results_without_seconds() {
        let parsed = parse_results_filename("SN12345_2025-07-20_08-15.csv");
        assert_eq!(parsed, Some(("SN12345".to_string(), dt(2025, 7, 20, 8, 15, 0))));
    }

    #[test]
    fn test_results_rejects_bad_names() {
        assert!(parse_results_filename("SN12345_2025-07-20_08-15-42.txt").is_none());
        assert!(parse_results_filename("SN12345_2025-13-20_08-15-42.csv").is_none());
        assert!(parse_results_filename("SN12345_2025-7-20_08-15-42.csv").is_none());
        assert!(parse_results_filename("_2025-07-20_08-15-42.csv").is_none());
        assert!(parse_results_filename("A_B_2025-07-20_08-15-42.csv").is_none());
        assert!(parse_results_filename("SN12345_2025-07-20.csv").is_none());
    }

    #[test]
    fn test_telemetry_names() {
        assert_eq!(
            parse_test_filename("inverter_SN12345_2025-07-18_09-00-01.csv"),
            Some(("SN12345".to_string(), dt(2025, 7, 18, 9, 0, 1)))
        );
        assert_eq!(
            parse_test_filename("inverter_SN12345_2025-07-18_09-00.csv"),
            Some(("SN12345".to_string(), dt(2025, 7, 18, 9, 0, 0)))
        );
        // A results name is not a telemetry name
        assert!(parse_test_filename("SN12345_2025-07-18_09-00.csv").is_none());
    }

    #[test]
    fn test_expected_names_round_trip() {
        let start = dt(2025, 7, 18, 9, 0, 1);
        let [seconds, minutes] = expected_test_filenames("SN9", start);
        assert_eq!(seconds, "inverter_SN9_2025-07-18_09-00-01.csv");
        assert_eq!(minutes, "inverter_SN9_2025-07-18_09-00.csv");
        assert_eq!(parse_test_filename(&seconds), Some(("SN9".to_string(), start)));
        assert!(seconds.starts_with(&test_file_prefix("SN9")));
    }
}
