//! Transformation engine: interprets a [`RuleSet`] against a loaded raw
//! table.
//!
//! `transform` is a pure function: rename, hook, typed parses, canonical
//! rename. Per-value parse failures degrade to missing cells and never abort
//! the table.

pub mod hooks;
pub mod rules;

pub use hooks::HookKind;
pub use rules::{ParseDirective, RuleSet};

use crate::parsers::{dates, fiscal, money, place};
use crate::table::RawTable;

/// Normalize a raw table under a rule set.
pub fn transform(raw: &RawTable, rules: &RuleSet) -> RawTable {
    let mut table = raw.clone();

    if rules.drop_empty_rows {
        table.drop_empty_rows();
    }

    for (from, to) in &rules.rename {
        table.rename_column(from, to);
    }

    if let Some(hook) = &rules.hook {
        hook.apply(&mut table);
    }

    for directive in &rules.directives {
        apply_directive(&mut table, directive);
    }

    for (from, to) in &rules.canonical {
        table.rename_column(from, to);
    }

    table
}

fn apply_directive(table: &mut RawTable, directive: &ParseDirective) {
    match directive {
        ParseDirective::Date { input, output } => {
            for i in 0..table.len() {
                let parsed = table.get(i, input).and_then(dates::parse);
                write_opt(table, i, output, parsed.map(|d| d.format("%Y-%m-%d").to_string()));
            }
        }
        ParseDirective::FiscalQuarter {
            input,
            date_output,
            year_output,
        } => {
            for i in 0..table.len() {
                let parsed = table.get(i, input).and_then(fiscal::parse_quarter);
                write_opt(
                    table,
                    i,
                    date_output,
                    parsed.map(|q| q.start.format("%Y-%m-%d").to_string()),
                );
                write_opt(table, i, year_output, parsed.map(|q| q.fiscal_year.to_string()));
            }
        }
        ParseDirective::MoneyRange {
            input,
            min_output,
            max_output,
            single_output,
            unit_output,
        } => {
            for i in 0..table.len() {
                let parsed = table
                    .get(i, input)
                    .map(money::parse_range)
                    .unwrap_or_default();
                write_opt(table, i, min_output, parsed.min.map(format_number));
                write_opt(table, i, max_output, parsed.max.map(format_number));
                write_opt(table, i, single_output, parsed.single.map(format_number));
                write_opt(table, i, unit_output, parsed.unit);
            }
        }
        ParseDirective::Place {
            input,
            city_output,
            state_output,
            country_output,
        } => {
            for i in 0..table.len() {
                let parsed = table.get(i, input).map(place::parse).unwrap_or_default();
                write_opt(table, i, city_output, parsed.city);
                write_opt(table, i, state_output, parsed.state);
                write_opt(table, i, country_output, parsed.country);
            }
        }
        ParseDirective::FiscalYear {
            explicit,
            award_date,
            quarter,
            output,
        } => {
            for i in 0..table.len() {
                let year = explicit
                    .as_deref()
                    .and_then(|col| table.get(i, col))
                    .and_then(parse_year_text)
                    .or_else(|| {
                        award_date
                            .as_deref()
                            .and_then(|col| table.get(i, col))
                            .and_then(dates::parse)
                            .map(fiscal::fiscal_year_of)
                    })
                    .or_else(|| {
                        quarter
                            .as_deref()
                            .and_then(|col| table.get(i, col))
                            .and_then(fiscal::parse_quarter)
                            .map(|q| q.fiscal_year)
                    });
                write_opt(table, i, output, year.map(|y| y.to_string()));
            }
        }
    }
}

/// Set or clear an output cell. `None` means the parse degraded and the output
/// reads as missing rather than keeping stale text.
fn write_opt(table: &mut RawTable, row: usize, column: &str, value: Option<String>) {
    table.ensure_column(column);
    match value {
        Some(v) => table.set(row, column, v),
        None => {
            if let Some(r) = table.rows.get_mut(row) {
                r.remove(column);
            }
        }
    }
}

/// "FY25", "2025", "25" → 2025.
fn parse_year_text(text: &str) -> Option<i32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        2 => digits.parse::<i32>().ok().map(|y| 2000 + y),
        4 => digits.parse::<i32>().ok(),
        _ => None,
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
