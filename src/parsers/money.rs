//! Money-range parsing for estimated contract values.
//!
//! Source text arrives as "$100K–$250K", "$1,500,000", "1M - 2M", "TBD".
//! Currency symbols and separators are stripped before numeric coercion;
//! `K`/`M`/`B` multipliers are honored.

use regex::Regex;
use std::sync::OnceLock;

/// Parsed value fields. `single` is the midpoint for ranges and the literal
/// amount otherwise; `unit` is set whenever a dollar amount was recognized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoneyRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub single: Option<f64>,
    pub unit: Option<String>,
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\$?\s*(?P<num>\d[\d,]*(?:\.\d+)?)\s*(?P<mult>[kmb])?\b")
            .expect("static regex")
    })
}

/// Parse free text into a [`MoneyRange`]. Text with no recognizable amount
/// yields all-`None` fields.
pub fn parse_range(text: &str) -> MoneyRange {
    let mut amounts: Vec<f64> = Vec::new();
    for caps in amount_re().captures_iter(text) {
        let digits = caps["num"].replace(',', "");
        let Ok(base) = digits.parse::<f64>() else {
            continue;
        };
        let mult = match caps.name("mult").map(|m| m.as_str().to_ascii_lowercase()) {
            Some(m) if m == "k" => 1e3,
            Some(m) if m == "m" => 1e6,
            Some(m) if m == "b" => 1e9,
            _ => 1.0,
        };
        amounts.push(base * mult);
    }

    match amounts.len() {
        0 => MoneyRange::default(),
        1 => MoneyRange {
            min: Some(amounts[0]),
            max: Some(amounts[0]),
            single: Some(amounts[0]),
            unit: Some("USD".to_string()),
        },
        _ => {
            let (lo, hi) = if amounts[0] <= amounts[1] {
                (amounts[0], amounts[1])
            } else {
                (amounts[1], amounts[0])
            };
            MoneyRange {
                min: Some(lo),
                max: Some(hi),
                single: Some((lo + hi) / 2.0),
                unit: Some("USD".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_with_multipliers() {
        let v = parse_range("$100K–$250K");
        assert_eq!(v.min, Some(100_000.0));
        assert_eq!(v.max, Some(250_000.0));
        assert_eq!(v.single, Some(175_000.0));
        assert_eq!(v.unit.as_deref(), Some("USD"));
    }

    #[test]
    fn typical_range_values() {
        let v = parse_range("$1M - $2M");
        assert_eq!(v.min, Some(1_000_000.0));
        assert_eq!(v.max, Some(2_000_000.0));
        assert_eq!(v.single, Some(1_500_000.0));
    }

    #[test]
    fn singular_amount_is_literal() {
        let v = parse_range("$1,500,000");
        assert_eq!(v.single, Some(1_500_000.0));
        assert_eq!(v.min, Some(1_500_000.0));
        assert_eq!(v.max, Some(1_500_000.0));
    }

    #[test]
    fn word_separated_range() {
        let v = parse_range("1M to 2.5M");
        assert_eq!(v.min, Some(1_000_000.0));
        assert_eq!(v.max, Some(2_500_000.0));
        assert_eq!(v.single, Some(1_750_000.0));
    }

    #[test]
    fn reversed_bounds_are_normalized() {
        let v = parse_range("$250K - $100K");
        assert_eq!(v.min, Some(100_000.0));
        assert_eq!(v.max, Some(250_000.0));
    }

    #[test]
    fn tbd_degrades_to_all_none() {
        let v = parse_range("TBD");
        assert_eq!(v, MoneyRange::default());
        assert_eq!(v.single, None);
        assert_eq!(v.unit, None);
    }
}
