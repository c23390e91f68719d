//! Query-string filters shared by list, statistics, analytics and report endpoints
//!
//! Every query built here starts from `tests t JOIN inverters i` and always
//! excludes debug firmware.

use burnin_common::db::OverallStatus;
use burnin_common::firmware::EXCLUDE_DEBUG_SQL;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{ApiError, ApiResult};

/// `FROM` clause every filtered query uses
pub const TESTS_FROM: &str = " FROM tests t JOIN inverters i ON i.id = t.inverter_id";

/// `?from=&to=&serial=&result=&page=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestFilter {
    /// First day (inclusive) of `start_time`
    pub from: Option<NaiveDate>,
    /// Last day (inclusive) of `start_time`
    pub to: Option<NaiveDate>,
    /// Serial number substring
    pub serial: Option<String>,
    /// PASS, FAIL or INVALID
    pub result: Option<String>,
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

impl TestFilter {
    /// Parsed `result`; unknown values are a 400
    pub fn status(&self) -> ApiResult<Option<OverallStatus>> {
        match self.result.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => OverallStatus::parse(value).map(Some).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Unknown result filter '{}' (expected PASS, FAIL or INVALID)",
                    value
                ))
            }),
        }
    }

    /// Append ` WHERE ...` for this filter
    ///
    /// `status` overrides the `result` parameter (analytics pin it to FAIL).
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>, status: Option<OverallStatus>) {
        qb.push(" WHERE ").push(EXCLUDE_DEBUG_SQL);

        if let Some(from) = self.from {
            qb.push(" AND date(t.start_time) >= ").push_bind(from);
        }
        if let Some(to) = self.to {
            qb.push(" AND date(t.start_time) <= ").push_bind(to);
        }
        if let Some(serial) = self.serial.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            qb.push(" AND i.serial_number LIKE ")
                .push_bind(format!("%{}%", escape_like(serial)))
                .push(" ESCAPE '\\'");
        }
        if let Some(status) = status {
            qb.push(" AND t.overall_status = ").push_bind(status);
        }
    }

    /// Validate the date range and the `result` value
    pub fn validated_status(&self) -> ApiResult<Option<OverallStatus>> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ApiError::BadRequest(format!(
                    "'from' ({}) is after 'to' ({})",
                    from, to
                )));
            }
        }
        self.status()
    }
}

/// Escape `\`, `%` and `_` so the value matches literally inside `LIKE ... ESCAPE '\'`
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(result: Option<&str>) -> TestFilter {
        TestFilter {
            result: result.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(filter(None).status().unwrap(), None);
        assert_eq!(filter(Some("")).status().unwrap(), None);
        assert_eq!(filter(Some("fail")).status().unwrap(), Some(OverallStatus::Fail));
        assert!(matches!(filter(Some("MAYBE")).status(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_reversed_range_rejected() {
        let f = TestFilter {
            from: NaiveDate::from_ymd_opt(2025, 7, 20),
            to: NaiveDate::from_ymd_opt(2025, 7, 1),
            ..Default::default()
        };
        assert!(matches!(f.validated_status(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_where_clause_always_excludes_debug() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        qb.push(TESTS_FROM);
        TestFilter::default().push_where(&mut qb, None);
        assert!(qb.sql().contains("1.11.11"));

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        qb.push(TESTS_FROM);
        let f = TestFilter {
            serial: Some("SN1".to_string()),
            ..Default::default()
        };
        f.push_where(&mut qb, Some(OverallStatus::Fail));
        let sql = qb.sql();
        assert!(sql.contains("LIKE"));
        assert!(sql.contains("ESCAPE"));
        assert!(sql.contains("overall_status"));
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("SN_1%"), "SN\\_1\\%");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("SN100"), "SN100");
    }
}
