//! Federal fiscal-quarter parsing.
//!
//! The federal fiscal year starts October 1: Q1 of FY25 is Oct–Dec 2024,
//! Q2 is Jan–Mar 2025, Q3 is Apr–Jun, Q4 is Jul–Sep.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// A parsed fiscal quarter: the first day of the quarter plus the fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalQuarter {
    pub start: NaiveDate,
    pub fiscal_year: i32,
}

fn quarter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "Q2 FY24", "FY24 Q2", "Q2, FY 2024", "Q2 2024"
        Regex::new(
            r"(?i)(?:fy\s*(?P<y1>\d{2,4})[\s,]*)?q(?P<q>[1-4])(?:[\s,]*(?:fy\s*)?(?P<y2>\d{2,4}))?",
        )
        .expect("static regex")
    })
}

/// Parse text like `"Q3 FY25"` into a representative date and fiscal year.
/// Unrecognized text yields `None`.
pub fn parse_quarter(text: &str) -> Option<FiscalQuarter> {
    let caps = quarter_re().captures(text.trim())?;
    let quarter: u32 = caps.name("q")?.as_str().parse().ok()?;
    let year_text = caps
        .name("y1")
        .or_else(|| caps.name("y2"))
        .map(|m| m.as_str())?;
    let fiscal_year = normalize_year(year_text.parse().ok()?)?;

    let (calendar_year, month) = match quarter {
        1 => (fiscal_year - 1, 10),
        2 => (fiscal_year, 1),
        3 => (fiscal_year, 4),
        4 => (fiscal_year, 7),
        _ => return None,
    };

    Some(FiscalQuarter {
        start: NaiveDate::from_ymd_opt(calendar_year, month, 1)?,
        fiscal_year,
    })
}

/// Fiscal year a calendar date falls in: October and later belong to the
/// next fiscal year.
pub fn fiscal_year_of(date: NaiveDate) -> i32 {
    if date.month() >= 10 {
        date.year() + 1
    } else {
        date.year()
    }
}

fn normalize_year(y: i32) -> Option<i32> {
    match y {
        0..=99 => Some(2000 + y),
        1990..=2200 => Some(y),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn quarter_fy_order() {
        let q = parse_quarter("Q2 FY24").unwrap();
        assert_eq!(q.fiscal_year, 2024);
        assert_eq!(q.start, d(2024, 1, 1));
    }

    #[test]
    fn fy_quarter_order_and_long_year() {
        let q = parse_quarter("FY2025 Q1").unwrap();
        assert_eq!(q.fiscal_year, 2025);
        assert_eq!(q.start, d(2024, 10, 1));
    }

    #[test]
    fn derived_date_falls_inside_the_quarter() {
        let q = parse_quarter("Q3 FY25").unwrap();
        assert_eq!(q.fiscal_year, 2025);
        assert!(q.start >= d(2025, 4, 1) && q.start <= d(2025, 6, 30));
    }

    #[test]
    fn fourth_quarter_ends_the_fiscal_year() {
        let q = parse_quarter("Q4 FY24").unwrap();
        assert_eq!(q.start, d(2024, 7, 1));
        assert_eq!(fiscal_year_of(q.start), 2024);
    }

    #[test]
    fn october_rolls_into_the_next_fiscal_year() {
        assert_eq!(fiscal_year_of(d(2024, 10, 1)), 2025);
        assert_eq!(fiscal_year_of(d(2024, 9, 30)), 2024);
    }

    #[test]
    fn unrecognized_text_yields_none() {
        assert_eq!(parse_quarter(""), None);
        assert_eq!(parse_quarter("TBD"), None);
        assert_eq!(parse_quarter("Q5 FY24"), None);
        assert_eq!(parse_quarter("Quarterly"), None);
    }
}
