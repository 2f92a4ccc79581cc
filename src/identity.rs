//! Content-addressed record identity and the transactional loader.
//!
//! Identity is a pure function of the source name and the values of the rule
//! set's designated dedup fields. The same listing re-scraped hashes to the
//! same identity; a changed hash-relevant field is a new record.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{NormalizedRecord, Source, Store};
use crate::table::RawTable;
use crate::transform::RuleSet;

/// `hex(sha256(source_name + "-" + dedup_values.join("-")))` over UTF-8.
/// A missing dedup field contributes an empty segment.
pub fn record_identity(source_name: &str, dedup_values: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    for value in dedup_values {
        hasher.update(b"-");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Identity for one transformed row, resolving dedup field names through the
/// rule set's canonical mapping.
pub fn row_identity(source_name: &str, table: &RawTable, row: usize, rules: &RuleSet) -> String {
    let values: Vec<&str> = rules
        .dedup_fields
        .iter()
        .map(|f| table.get(row, rules.resolved_field(f)).unwrap_or(""))
        .collect();
    record_identity(source_name, &values)
}

/// Upsert every row of a transformed table in one transaction.
///
/// Returns the number of rows processed. Enrichment columns on existing
/// records survive the reload unless `preserve_enrichment` is false. Any
/// failure rolls the whole load back and surfaces as [`Error::Load`].
pub fn load(
    store: &Store,
    source: &Source,
    table: &RawTable,
    rules: &RuleSet,
    preserve_enrichment: bool,
) -> Result<usize> {
    let records: Vec<NormalizedRecord> = (0..table.len())
        .map(|i| {
            let identity = row_identity(&source.name, table, i, rules);
            NormalizedRecord::from_row(identity, &table.rows[i], source.id)
        })
        .collect();

    let count = records.len();
    store.with_conn(|conn| {
        let tx = conn
            .transaction()
            .map_err(|e| Error::Load(format!("could not begin load transaction: {e}")))?;
        for record in &records {
            crate::store::record::upsert(&tx, record, preserve_enrichment)
                .map_err(|e| Error::Load(format!("row {} failed: {e}", record.identity)))?;
        }
        tx.commit()
            .map_err(|e| Error::Load(format!("load commit failed: {e}")))?;
        Ok(())
    })?;

    debug!(source = %source.name, rows = count, "load committed");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RunState;

    fn seeded(store: &Store) -> Source {
        let mut source = Source {
            id: 0,
            name: "Agency A".to_string(),
            short_name: "agency_a".to_string(),
            base_url: "https://example.gov".to_string(),
            driver_key: "generic".to_string(),
            last_scraped_at: None,
            refresh_days: None,
        };
        source.id = store.upsert_source(&source).unwrap();
        source
    }

    fn rules() -> RuleSet {
        RuleSet {
            dedup_fields: vec!["native_id".into(), "title".into()],
            ..Default::default()
        }
    }

    fn one_row_table(native_id: &str, title: &str, desc: &str) -> RawTable {
        RawTable::from_rows(
            vec!["native_id".into(), "title".into(), "description".into()],
            vec![vec![native_id.into(), title.into(), desc.into()]],
        )
    }

    #[test]
    fn identity_is_idempotent_and_source_scoped() {
        let a = record_identity("Agency A", &["123", "Road Study"]);
        let b = record_identity("Agency A", &["123", "Road Study"]);
        let c = record_identity("Agency B", &["123", "Road Study"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn missing_dedup_field_contributes_empty_segment() {
        let table = one_row_table("123", "Road Study", "");
        let mut r = rules();
        r.dedup_fields.push("absent".into());
        let with_absent = row_identity("Agency A", &table, 0, &r);
        assert_eq!(
            with_absent,
            record_identity("Agency A", &["123", "Road Study", ""])
        );
    }

    #[test]
    fn reload_does_not_duplicate() {
        let store = Store::open_in_memory().unwrap();
        let source = seeded(&store);
        let table = one_row_table("123", "Road Study", "corridor analysis");

        assert_eq!(load(&store, &source, &table, &rules(), true).unwrap(), 1);
        assert_eq!(load(&store, &source, &table, &rules(), true).unwrap(), 1);
        assert_eq!(store.count_records(source.id).unwrap(), 1);
    }

    #[test]
    fn changed_dedup_value_is_a_new_record() {
        let store = Store::open_in_memory().unwrap();
        let source = seeded(&store);

        load(&store, &source, &one_row_table("123", "Road Study", ""), &rules(), true).unwrap();
        load(&store, &source, &one_row_table("123", "Bridge Study", ""), &rules(), true).unwrap();
        assert_eq!(store.count_records(source.id).unwrap(), 2);
    }

    #[test]
    fn enrichment_survives_reload() {
        let store = Store::open_in_memory().unwrap();
        let source = seeded(&store);
        let table = one_row_table("123", "Road Study", "v1");
        load(&store, &source, &table, &rules(), true).unwrap();

        let identity = row_identity(&source.name, &table, 0, &rules());
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE records SET enrich_summary = 'summary', enriched_at = '2026-08-01T00:00:00Z'
                     WHERE identity = ?1",
                    rusqlite::params![identity],
                )?;
                Ok(())
            })
            .unwrap();

        let table2 = one_row_table("123", "Road Study", "v2");
        load(&store, &source, &table2, &rules(), true).unwrap();
        let rec = store.get_record(&identity).unwrap().unwrap();
        assert_eq!(rec.field("description"), Some("v2"));
        assert_eq!(rec.enrich_summary.as_deref(), Some("summary"));

        load(&store, &source, &table2, &rules(), false).unwrap();
        let rec = store.get_record(&identity).unwrap().unwrap();
        assert_eq!(rec.enrich_summary, None);
    }

    #[test]
    fn empty_table_loads_zero_rows() {
        let store = Store::open_in_memory().unwrap();
        let source = seeded(&store);
        let table = RawTable::from_rows(vec!["native_id".into()], vec![]);
        assert_eq!(load(&store, &source, &table, &rules(), true).unwrap(), 0);
        let status = store.get_run_status(source.id).unwrap().unwrap();
        assert_eq!(status.state, RunState::Pending);
    }
}
