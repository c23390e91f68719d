//! Database row models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Overall verdict of a burn-in run
///
/// Stored as the uppercase text the `tests.overall_status` CHECK constraint allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Pass,
    Fail,
    Invalid,
}

impl OverallStatus {
    /// Stored column value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Invalid => "INVALID",
        }
    }

    /// Strict parse of a stored or query-string value (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PASS" => Some(Self::Pass),
            "FAIL" => Some(Self::Fail),
            "INVALID" => Some(Self::Invalid),
            _ => None,
        }
    }

    /// Lenient mapping of a station's verdict cell; unknown values are INVALID
    pub fn from_station_verdict(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PASS" | "PASSED" | "P" | "TRUE" | "OK" => Self::Pass,
            "FAIL" | "FAILED" | "F" | "FALSE" => Self::Fail,
            _ => Self::Invalid,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `tests` row joined with its inverter's serial number
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TestRecord {
    pub id: i64,
    pub inverter_id: i64,
    pub serial_number: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub firmware_version: Option<String>,
    pub channel_status: Json<BTreeMap<String, String>>,
    pub overall_status: OverallStatus,
    pub failure_description: Option<String>,
    pub results_file: Option<String>,
    pub data_file: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One telemetry sample
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TestDataPoint {
    pub timestamp: NaiveDateTime,
    pub readings: Json<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TestAnnotation {
    pub id: i64,
    pub test_id: i64,
    pub annotation_text: String,
    pub annotation_group: Option<String>,
    pub created_by: String,
    pub created_by_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnotationGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnotationQuickOption {
    pub id: i64,
    pub option_text: String,
    pub group_id: Option<i64>,
    pub group_name: Option<String>,
}
