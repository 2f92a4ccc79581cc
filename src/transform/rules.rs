//! Declarative per-source rule sets.
//!
//! A [`RuleSet`] is structured data, not code: two rename maps, an ordered
//! list of typed-parse directives, one optional named hook, the dedup field
//! list, and an empty-row-drop flag. Rule sets are serde documents so sources
//! can be described entirely in configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::hooks::HookKind;

/// Everything the transform pipeline needs to know about one source's layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Raw column header → intermediate field name. Only columns actually
    /// present in the file are renamed; the rest of the map is ignored.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Optional custom hook, run once after renaming.
    #[serde(default)]
    pub hook: Option<HookKind>,

    /// Typed-parse directives, applied in order.
    #[serde(default)]
    pub directives: Vec<ParseDirective>,

    /// Intermediate field name → canonical record field name.
    #[serde(default)]
    pub canonical: BTreeMap<String, String>,

    /// Intermediate field names hashed (with the source name) into the
    /// record identity.
    #[serde(default)]
    pub dedup_fields: Vec<String>,

    /// Drop rows whose cells are all empty before any other step.
    #[serde(default)]
    pub drop_empty_rows: bool,
}

impl RuleSet {
    /// Resolve an intermediate field name to its post-rename column, falling
    /// back to the intermediate name when no canonical mapping exists.
    pub fn resolved_field<'a>(&'a self, intermediate: &'a str) -> &'a str {
        self.canonical
            .get(intermediate)
            .map(String::as_str)
            .unwrap_or(intermediate)
    }
}

/// One typed-parse step: input column(s), parser kind, output column(s).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseDirective {
    /// Multi-format date parse; output is ISO `YYYY-MM-DD`.
    Date { input: String, output: String },

    /// `"Q2 FY24"` → quarter-start date plus fiscal year.
    FiscalQuarter {
        input: String,
        date_output: String,
        year_output: String,
    },

    /// Money text → min/max/midpoint/unit columns.
    MoneyRange {
        input: String,
        min_output: String,
        max_output: String,
        single_output: String,
        unit_output: String,
    },

    /// `"City, ST[, Country]"` → three place columns.
    Place {
        input: String,
        city_output: String,
        state_output: String,
        country_output: String,
    },

    /// Fiscal-year derivation chain: an explicit fiscal-year column wins,
    /// else the year is derived from a parsed award date, else from a
    /// fiscal-quarter string.
    FiscalYear {
        #[serde(default)]
        explicit: Option<String>,
        #[serde(default)]
        award_date: Option<String>,
        #[serde(default)]
        quarter: Option<String>,
        output: String,
    },
}
