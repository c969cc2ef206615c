//! Search filter construction.

use chrono::{DateTime, Duration, Utc};

/// Timestamp syntax of `whenChanged` (generalized time).
const GENERALIZED_TIME: &str = "%Y%m%d%H%M%S.0Z";

const PERSON_FILTER: &str = "(objectCategory=Person)";

/// Which entries a run extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMode {
    /// Every person entry.
    Bulk,
    /// Person entries changed within the delta window.
    Delta,
    /// A caller supplied filter, used as-is.
    Literal(String),
}

impl QueryMode {
    /// `bulk` and `delta` are matched exactly; anything else is a filter.
    pub fn parse(mode: &str) -> Self {
        match mode {
            "bulk" => QueryMode::Bulk,
            "delta" => QueryMode::Delta,
            other => QueryMode::Literal(other.to_string()),
        }
    }
}

/// Build the search filter for `mode`.
///
/// A delta query covers `[now - delta_days, now]` on `whenChanged`.
pub fn build_query_filter(mode: &str, now: DateTime<Utc>, delta_days: u32) -> String {
    match QueryMode::parse(mode) {
        QueryMode::Bulk => PERSON_FILTER.to_string(),
        QueryMode::Delta => {
            let upper = now.format(GENERALIZED_TIME);
            let lower = (now - Duration::days(i64::from(delta_days))).format(GENERALIZED_TIME);
            format!("(&(whenChanged>={lower})(whenChanged<={upper}){PERSON_FILTER})")
        }
        QueryMode::Literal(filter) => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_bulk_filter() {
        assert_eq!(build_query_filter("bulk", now(), 2), "(objectCategory=Person)");
    }

    #[test]
    fn test_mode_names_are_case_sensitive() {
        assert_eq!(QueryMode::parse("Delta"), QueryMode::Literal("Delta".to_string()));
        assert_eq!(build_query_filter("BULK", now(), 2), "BULK");
    }

    #[test]
    fn test_delta_window() {
        assert_eq!(
            build_query_filter("delta", now(), 2),
            "(&(whenChanged>=20240108000000.0Z)(whenChanged<=20240110000000.0Z)(objectCategory=Person))"
        );
    }

    #[test]
    fn test_delta_window_crosses_month() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 13, 45, 30).unwrap();
        assert_eq!(
            build_query_filter("delta", now, 2),
            "(&(whenChanged>=20240228134530.0Z)(whenChanged<=20240301134530.0Z)(objectCategory=Person))"
        );
    }

    #[test]
    fn test_literal_passthrough() {
        let filter = "(&(objectClass=user)(department=Sales))";
        assert_eq!(build_query_filter(filter, now(), 2), filter);
        assert_eq!(
            QueryMode::parse(filter),
            QueryMode::Literal(filter.to_string())
        );
    }
}
