//! Canonical normalized record: column list, row mapping, and upsert.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The canonical columns a transformed table may carry. Anything else lands
/// in the `extra` JSON bag.
pub const CANONICAL_FIELDS: &[&str] = &[
    "native_id",
    "title",
    "description",
    "agency",
    "naics_code",
    "value_raw",
    "value_min",
    "value_max",
    "value_single",
    "value_unit",
    "release_date",
    "award_date",
    "award_fiscal_year",
    "place_city",
    "place_state",
    "place_country",
    "contract_type",
    "set_aside",
    "contact_name",
    "contact_email",
    "contact_phone",
];

/// One normalized procurement-forecast listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub identity: String,
    /// Canonical field → value, only for fields present in the row.
    pub fields: BTreeMap<String, String>,
    /// Unmapped leftovers, stored as a JSON object.
    pub extra: BTreeMap<String, String>,
    pub source_id: i64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub enrich_summary: Option<String>,
    pub enrich_tags: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl NormalizedRecord {
    /// Split a transformed row into canonical fields and the extra bag.
    pub fn from_row(identity: String, row: &std::collections::HashMap<String, String>, source_id: i64) -> Self {
        let mut fields = BTreeMap::new();
        let mut extra = BTreeMap::new();
        for (k, v) in row {
            if v.is_empty() {
                continue;
            }
            if CANONICAL_FIELDS.contains(&k.as_str()) {
                fields.insert(k.clone(), v.clone());
            } else {
                extra.insert(k.clone(), v.clone());
            }
        }
        Self {
            identity,
            fields,
            extra,
            source_id,
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Insert or update a record inside the caller's transaction. On conflict the
/// canonical columns and extra bag are replaced; the enrichment columns are
/// left alone unless `preserve_enrichment` is false, in which case they reset.
pub fn upsert(
    conn: &Connection,
    record: &NormalizedRecord,
    preserve_enrichment: bool,
) -> Result<()> {
    let extra_json = serde_json::to_string(&record.extra)
        .map_err(|e| Error::Load(format!("extra bag not serializable: {e}")))?;
    let field = |name: &str| record.fields.get(name).map(String::as_str);

    let enrich_clause = if preserve_enrichment {
        ""
    } else {
        ", enrich_summary = NULL, enrich_tags = NULL, enriched_at = NULL"
    };
    let sql = format!(
        "INSERT INTO records (identity, native_id, title, description, agency, naics_code,
             value_raw, value_min, value_max, value_single, value_unit,
             release_date, award_date, award_fiscal_year,
             place_city, place_state, place_country,
             contract_type, set_aside, contact_name, contact_email, contact_phone,
             extra, source_id, loaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
         ON CONFLICT(identity) DO UPDATE SET
             native_id = excluded.native_id,
             title = excluded.title,
             description = excluded.description,
             agency = excluded.agency,
             naics_code = excluded.naics_code,
             value_raw = excluded.value_raw,
             value_min = excluded.value_min,
             value_max = excluded.value_max,
             value_single = excluded.value_single,
             value_unit = excluded.value_unit,
             release_date = excluded.release_date,
             award_date = excluded.award_date,
             award_fiscal_year = excluded.award_fiscal_year,
             place_city = excluded.place_city,
             place_state = excluded.place_state,
             place_country = excluded.place_country,
             contract_type = excluded.contract_type,
             set_aside = excluded.set_aside,
             contact_name = excluded.contact_name,
             contact_email = excluded.contact_email,
             contact_phone = excluded.contact_phone,
             extra = excluded.extra,
             source_id = excluded.source_id,
             loaded_at = excluded.loaded_at{enrich_clause}"
    );
    conn.execute(
        &sql,
        params![
            record.identity,
            field("native_id"),
            field("title"),
            field("description"),
            field("agency"),
            field("naics_code"),
            field("value_raw"),
            field("value_min"),
            field("value_max"),
            field("value_single"),
            field("value_unit"),
            field("release_date"),
            field("award_date"),
            field("award_fiscal_year"),
            field("place_city"),
            field("place_state"),
            field("place_country"),
            field("contract_type"),
            field("set_aside"),
            field("contact_name"),
            field("contact_email"),
            field("contact_phone"),
            extra_json,
            record.source_id,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(super) fn get(conn: &Connection, identity: &str) -> Result<Option<NormalizedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT identity, native_id, title, description, agency, naics_code,
                value_raw, value_min, value_max, value_single, value_unit,
                release_date, award_date, award_fiscal_year,
                place_city, place_state, place_country,
                contract_type, set_aside, contact_name, contact_email, contact_phone,
                extra, source_id, loaded_at, enrich_summary, enrich_tags, enriched_at
         FROM records WHERE identity = ?1",
    )?;
    let row = stmt
        .query_row(params![identity], |row| {
            let mut fields = BTreeMap::new();
            for (i, name) in CANONICAL_FIELDS.iter().enumerate() {
                if let Some(v) = row.get::<_, Option<String>>(i + 1)? {
                    fields.insert((*name).to_string(), v);
                }
            }
            Ok((
                row.get::<_, String>(0)?,
                fields,
                row.get::<_, String>(22)?,
                row.get::<_, i64>(23)?,
                row.get::<_, String>(24)?,
                row.get::<_, Option<String>>(25)?,
                row.get::<_, Option<String>>(26)?,
                row.get::<_, Option<String>>(27)?,
            ))
        })
        .optional()?;

    row.map(
        |(identity, fields, extra_json, source_id, loaded_at, summary, tags, enriched_at)| {
            let extra: BTreeMap<String, String> = serde_json::from_str(&extra_json)
                .map_err(|e| Error::Load(format!("stored extra bag unreadable: {e}")))?;
            Ok(NormalizedRecord {
                identity,
                fields,
                extra,
                source_id,
                loaded_at: Some(super::parse_utc(&loaded_at)?),
                enrich_summary: summary,
                enrich_tags: tags,
                enriched_at: enriched_at.as_deref().map(super::parse_utc).transpose()?,
            })
        },
    )
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn row_splits_into_canonical_and_extra() {
        let mut row = HashMap::new();
        row.insert("title".to_string(), "Road Study".to_string());
        row.insert("native_id".to_string(), "123".to_string());
        row.insert("incumbent".to_string(), "Acme".to_string());
        row.insert("blank".to_string(), String::new());

        let rec = NormalizedRecord::from_row("abc".to_string(), &row, 1);
        assert_eq!(rec.field("title"), Some("Road Study"));
        assert_eq!(rec.extra.get("incumbent").map(String::as_str), Some("Acme"));
        assert!(!rec.fields.contains_key("blank"));
        assert!(!rec.extra.contains_key("blank"));
    }
}
