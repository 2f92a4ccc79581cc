//! Seed sources from a JSON document.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::output;
use crate::config::Config;
use crate::store::Source;

/// One entry of the seed file. `short_name` is derived, never supplied.
#[derive(Debug, Deserialize)]
struct SeedEntry {
    name: String,
    base_url: String,
    driver_key: String,
    #[serde(default)]
    refresh_days: Option<u32>,
}

pub async fn run(path: &str) -> Result<()> {
    let config = Config::from_env();
    let store = super::open_store(&config)?;

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read seed file {path}"))?;
    let entries: Vec<SeedEntry> =
        serde_json::from_str(&text).with_context(|| format!("seed file {path} is malformed"))?;

    let mut seeded = Vec::with_capacity(entries.len());
    for entry in entries {
        let source = Source {
            id: 0,
            short_name: short_name_of(&entry.name),
            name: entry.name,
            base_url: entry.base_url,
            driver_key: entry.driver_key,
            last_scraped_at: None,
            refresh_days: entry.refresh_days,
        };
        let id = store.upsert_source(&source)?;
        seeded.push((id, source.name, source.short_name));
    }

    if output::is_json() {
        let lines: Vec<_> = seeded
            .iter()
            .map(|(id, name, short)| {
                serde_json::json!({"id": id, "name": name, "short_name": short})
            })
            .collect();
        output::print_json(&lines);
    } else {
        for (id, name, short) in &seeded {
            println!("seeded {name} (id {id}, short name {short})");
        }
    }
    Ok(())
}

/// Filesystem-safe short name: lowercase, runs of non-alphanumerics collapse
/// to single underscores.
pub fn short_name_of(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_filesystem_safe() {
        assert_eq!(short_name_of("Dept. of Transportation"), "dept_of_transportation");
        assert_eq!(short_name_of("Agency A"), "agency_a");
        assert_eq!(short_name_of("  GSA / Region 7  "), "gsa_region_7");
    }

    #[test]
    fn seed_entries_deserialize() {
        let json = r#"[
            {"name": "Agency A", "base_url": "https://a.example.gov", "driver_key": "agency_a"},
            {"name": "Agency B", "base_url": "https://b.example.gov",
             "driver_key": "agency_b", "refresh_days": 14}
        ]"#;
        let entries: Vec<SeedEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].refresh_days, Some(14));
    }
}
