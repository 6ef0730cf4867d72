//! Calendar-date parsing and period-key derivation.
//!
//! Dates in QI data files are calendar days without a time zone, so
//! everything here works on [`NaiveDate`].

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::{QiError, Result};
use crate::models::AggregationPeriod;

// ── Date parsing ──────────────────────────────────────────────────────────────

/// `YYYY-MM-DD`, optionally followed by a `T` or space and a time part.
fn iso_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").expect("regex is valid")
    })
}

/// `YYYY/MM/DD`.
fn ymd_slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})$").expect("regex is valid"))
}

/// US-style `MM/DD/YYYY`.
fn mdy_slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("regex is valid"))
}

/// Parse a calendar date from the text of a date cell.
///
/// Accepted forms: `2024-01-15`, `2024-01-15T08:30:00Z`, `2024-01-15 08:30`,
/// `2024/01/15` and `01/15/2024`. Returns `None` for anything else,
/// including impossible dates such as `2024-02-30`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let field = |caps: &regex::Captures<'_>, i: usize| -> Option<u32> { caps[i].parse().ok() };

    if let Some(caps) = iso_prefix_re()
        .captures(s)
        .or_else(|| ymd_slash_re().captures(s))
    {
        let year: i32 = caps[1].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, field(&caps, 2)?, field(&caps, 3)?);
    }

    if let Some(caps) = mdy_slash_re().captures(s) {
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, field(&caps, 1)?, field(&caps, 2)?);
    }

    None
}

/// Strict variant of [`parse_date`] for user-entered dates (interventions).
pub fn parse_date_strict(s: &str) -> Result<NaiveDate> {
    parse_date(s).ok_or_else(|| QiError::DateParse(s.to_string()))
}

// ── Period keys ───────────────────────────────────────────────────────────────

/// ISO-8601 week key, e.g. `"2024-W01"`.
///
/// The year is the ISO week-numbering year, i.e. the calendar year of the
/// Thursday in the same Monday-based week, so `2021-01-01` (a Friday) maps to
/// `"2020-W53"`.
pub fn week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Calendar month key, e.g. `"2024-01"`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{}-{:02}", date.year(), date.month())
}

/// Day key, e.g. `"2024-01-15"`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Map `date` to the bucket key for `period`.
pub fn period_key(date: NaiveDate, period: AggregationPeriod) -> String {
    match period {
        AggregationPeriod::Daily => day_key(date),
        AggregationPeriod::Weekly => week_key(date),
        AggregationPeriod::Monthly => month_key(date),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // ── parse_date ────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_date("2024-01-15"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date(" 2024-1-5 "), Some(d(2024, 1, 5)));
    }

    #[test]
    fn test_parse_iso_datetime_prefix() {
        assert_eq!(parse_date("2024-01-15T08:30:00Z"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15 08:30"), Some(d(2024, 1, 15)));
    }

    #[test]
    fn test_parse_slash_forms() {
        assert_eq!(parse_date("2024/03/09"), Some(d(2024, 3, 9)));
        assert_eq!(parse_date("03/09/2024"), Some(d(2024, 3, 9)));
    }

    #[test]
    fn test_parse_rejects_garbage_and_impossible_dates() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("week one"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("2024-13-01"), None);
    }

    #[test]
    fn test_parse_date_strict_error() {
        let err = parse_date_strict("soon").unwrap_err();
        assert_eq!(err.to_string(), "Invalid date: soon");
    }

    // ── week_key: ISO boundaries ──────────────────────────────────────────────

    #[test]
    fn test_week_key_jan_1_monday() {
        // 2024-01-01 is a Monday.
        assert_eq!(week_key(d(2024, 1, 1)), "2024-W01");
        assert_eq!(week_key(d(2024, 1, 8)), "2024-W02");
    }

    #[test]
    fn test_week_key_jan_1_wednesday() {
        // 2020-01-01 is a Wednesday; its Thursday is in 2020.
        assert_eq!(week_key(d(2020, 1, 1)), "2020-W01");
        assert_eq!(week_key(d(2019, 12, 30)), "2020-W01");
    }

    #[test]
    fn test_week_key_jan_1_thursday() {
        // 2015-01-01 is a Thursday.
        assert_eq!(week_key(d(2015, 1, 1)), "2015-W01");
        // 2026 starts on a Thursday, so it has 53 weeks.
        assert_eq!(week_key(d(2026, 12, 31)), "2026-W53");
    }

    #[test]
    fn test_week_key_jan_1_friday() {
        // 2021-01-01 is a Friday and belongs to the last week of 2020.
        assert_eq!(week_key(d(2021, 1, 1)), "2020-W53");
        assert_eq!(week_key(d(2021, 1, 4)), "2021-W01");
    }

    #[test]
    fn test_week_key_jan_1_saturday_and_sunday() {
        // 2022-01-01 is a Saturday, 2023-01-01 a Sunday.
        assert_eq!(week_key(d(2022, 1, 1)), "2021-W52");
        assert_eq!(week_key(d(2023, 1, 1)), "2022-W52");
        assert_eq!(week_key(d(2023, 1, 2)), "2023-W01");
    }

    #[test]
    fn test_week_key_late_december_rolls_forward() {
        // 2024-12-30 is a Monday whose Thursday is 2025-01-02.
        assert_eq!(week_key(d(2024, 12, 30)), "2025-W01");
    }

    // ── month_key / period_key ────────────────────────────────────────────────

    #[test]
    fn test_month_key_zero_padded() {
        assert_eq!(month_key(d(2024, 3, 31)), "2024-03");
        assert_eq!(month_key(d(2024, 11, 1)), "2024-11");
    }

    #[test]
    fn test_period_key_dispatch() {
        let date = d(2024, 1, 15);
        assert_eq!(period_key(date, AggregationPeriod::Daily), "2024-01-15");
        assert_eq!(period_key(date, AggregationPeriod::Weekly), "2024-W03");
        assert_eq!(period_key(date, AggregationPeriod::Monthly), "2024-01");
    }
}
