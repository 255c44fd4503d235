//! Calendar helpers for yearly partitions

use chrono::{Datelike, NaiveDate, Utc};

/// First day of `year`, or `None` when the year is outside chrono's range
pub fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Half-open range `[year-01-01, year+1-01-01)` covered by one yearly partition
pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((year_start(year)?, year_start(year.checked_add(1)?)?))
}

/// Current calendar year (UTC)
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_bounds() {
        let (from, to) = year_bounds(2015).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
    }

    #[test]
    fn test_year_bounds_out_of_range() {
        assert!(year_bounds(i32::MAX).is_none());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2015-06-30"),
            NaiveDate::from_ymd_opt(2015, 6, 30)
        );
        assert_eq!(parse_date(" 2015-06-30 "), NaiveDate::from_ymd_opt(2015, 6, 30));
        assert!(parse_date("2015/06/30").is_none());
        assert!(parse_date("2015-02-30").is_none());
    }

    #[test]
    fn test_current_year_is_plausible() {
        assert!(current_year() >= 2024);
    }
}
