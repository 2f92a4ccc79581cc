//! Multi-format date parsing with a lenient fallback.

use chrono::NaiveDate;

/// Concrete formats tried in order, most common first.
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y-%m-%d",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
];

/// Datetime formats some exports use; the time component is discarded.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a date out of free text. Returns `None` for anything unparseable.
pub fn parse(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }

    fallback(trimmed)
}

/// Lenient second pass: strip ordinal suffixes ("June 3rd, 2025") and any
/// trailing time token, then retry the concrete formats.
fn fallback(text: &str) -> Option<NaiveDate> {
    let cleaned = strip_ordinals(text);
    let cleaned = cleaned
        .split(|c| c == 'T')
        .next()
        .unwrap_or(&cleaned)
        .trim()
        .to_string();

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(d);
        }
    }

    // Last resort: a leading "MM/DD/YYYY" or "YYYY-MM-DD" token followed by
    // anything else (timezone labels, annotations).
    let first_token = cleaned.split_whitespace().next()?;
    for fmt in &["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y"] {
        if let Ok(d) = NaiveDate::parse_from_str(first_token, fmt) {
            return Some(d);
        }
    }

    None
}

fn strip_ordinals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            let suffix: String = chars[j..].iter().take(2).collect::<String>().to_lowercase();
            out.extend(&chars[i..j]);
            if matches!(suffix.as_str(), "st" | "nd" | "rd" | "th") {
                i = j + 2;
            } else {
                i = j;
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
