//! SQLite-backed store for sources, run status, normalized records, and
//! download artifacts.
//!
//! One connection, owned by the [`Store`] and guarded by a mutex so the async
//! orchestrator can share it across tasks. Schema creation is idempotent.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub(crate) mod record;

pub use record::NormalizedRecord;

/// Maximum length of a RunStatus detail string. Longer messages are cut so a
/// stack of wrapped errors cannot bloat the status table.
pub const DETAIL_MAX: usize = 500;

/// A configured scrape target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub base_url: String,
    pub driver_key: String,
    #[serde(default)]
    pub last_scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_days: Option<u32>,
}

/// Lifecycle state of the most recent run for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Working,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "working" => Ok(Self::Working),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown run state: {other}"))),
        }
    }
}

/// Current run status row, one per source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub source_id: i64,
    pub state: RunState,
    pub checked_at: DateTime<Utc>,
    pub detail: String,
    pub records_found: Option<i64>,
}

/// A downloaded file recorded at the end of a successful extract phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadArtifact {
    pub path: String,
    pub source_id: i64,
    pub byte_size: i64,
    pub downloaded_at: DateTime<Utc>,
    pub success: bool,
    pub rows_seen: Option<i64>,
    pub rows_loaded: Option<i64>,
}

/// The engine's transactional store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the store at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                short_name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                driver_key TEXT NOT NULL,
                last_scraped_at TEXT,
                refresh_days INTEGER
            );
            CREATE TABLE IF NOT EXISTS run_status (
                source_id INTEGER PRIMARY KEY REFERENCES sources(id),
                state TEXT NOT NULL,
                checked_at TEXT NOT NULL,
                detail TEXT NOT NULL DEFAULT '',
                records_found INTEGER
            );
            CREATE TABLE IF NOT EXISTS records (
                identity TEXT PRIMARY KEY,
                native_id TEXT,
                title TEXT,
                description TEXT,
                agency TEXT,
                naics_code TEXT,
                value_raw TEXT,
                value_min TEXT,
                value_max TEXT,
                value_single TEXT,
                value_unit TEXT,
                release_date TEXT,
                award_date TEXT,
                award_fiscal_year TEXT,
                place_city TEXT,
                place_state TEXT,
                place_country TEXT,
                contract_type TEXT,
                set_aside TEXT,
                contact_name TEXT,
                contact_email TEXT,
                contact_phone TEXT,
                extra TEXT NOT NULL DEFAULT '{}',
                source_id INTEGER NOT NULL REFERENCES sources(id),
                loaded_at TEXT NOT NULL,
                enrich_summary TEXT,
                enrich_tags TEXT,
                enriched_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_id);
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                byte_size INTEGER NOT NULL,
                downloaded_at TEXT NOT NULL,
                success INTEGER NOT NULL,
                rows_seen INTEGER,
                rows_loaded INTEGER
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with the connection locked.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    // -- sources ----------------------------------------------------------

    /// Insert a source if its name is new; returns its id either way. A
    /// re-seeded source keeps its id, records, and status row.
    pub fn upsert_source(&self, source: &Source) -> Result<i64> {
        self.with_conn(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM sources WHERE name = ?1",
                    params![source.name],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                conn.execute(
                    "UPDATE sources SET short_name = ?2, base_url = ?3, driver_key = ?4,
                         refresh_days = ?5 WHERE id = ?1",
                    params![
                        id,
                        source.short_name,
                        source.base_url,
                        source.driver_key,
                        source.refresh_days
                    ],
                )?;
                return Ok(id);
            }
            conn.execute(
                "INSERT INTO sources (name, short_name, base_url, driver_key, refresh_days)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    source.name,
                    source.short_name,
                    source.base_url,
                    source.driver_key,
                    source.refresh_days
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO run_status (source_id, state, checked_at, detail)
                 VALUES (?1, 'pending', ?2, '')",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok(id)
        })
    }

    pub fn get_source(&self, id: i64) -> Result<Option<Source>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, short_name, base_url, driver_key, last_scraped_at, refresh_days
                 FROM sources WHERE id = ?1",
                params![id],
                row_to_source,
            )
            .optional()
            .map_err(Error::from)
        })
    }

    pub fn get_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, short_name, base_url, driver_key, last_scraped_at, refresh_days
                 FROM sources WHERE name = ?1 OR short_name = ?1",
                params![name],
                row_to_source,
            )
            .optional()
            .map_err(Error::from)
        })
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, short_name, base_url, driver_key, last_scraped_at, refresh_days
                 FROM sources ORDER BY name",
            )?;
            let sources = stmt
                .query_map([], row_to_source)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(sources)
        })
    }

    /// Stamp the successful-scrape time. Only the orchestrator calls this.
    pub fn touch_last_scraped(&self, source_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sources SET last_scraped_at = ?2 WHERE id = ?1",
                params![source_id, at.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    // -- run status -------------------------------------------------------

    /// Transition the status row for a source, truncating `detail` to
    /// [`DETAIL_MAX`] characters.
    pub fn set_run_status(
        &self,
        source_id: i64,
        state: RunState,
        detail: &str,
        records_found: Option<i64>,
    ) -> Result<()> {
        let detail: String = detail.chars().take(DETAIL_MAX).collect();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO run_status (source_id, state, checked_at, detail, records_found)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source_id) DO UPDATE SET
                     state = excluded.state,
                     checked_at = excluded.checked_at,
                     detail = excluded.detail,
                     records_found = excluded.records_found",
                params![
                    source_id,
                    state.as_str(),
                    Utc::now().to_rfc3339(),
                    detail,
                    records_found
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_run_status(&self, source_id: i64) -> Result<Option<RunStatus>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT source_id, state, checked_at, detail, records_found
                 FROM run_status WHERE source_id = ?1",
                params![source_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(Error::from)?
            .map(|(source_id, state, checked_at, detail, records_found)| {
                Ok(RunStatus {
                    source_id,
                    state: RunState::from_str(&state)?,
                    checked_at: parse_utc(&checked_at)?,
                    detail,
                    records_found,
                })
            })
            .transpose()
        })
    }

    // -- artifacts --------------------------------------------------------

    pub fn record_artifact(&self, artifact: &DownloadArtifact) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO artifacts
                     (path, source_id, byte_size, downloaded_at, success, rows_seen, rows_loaded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    artifact.path,
                    artifact.source_id,
                    artifact.byte_size,
                    artifact.downloaded_at.to_rfc3339(),
                    artifact.success,
                    artifact.rows_seen,
                    artifact.rows_loaded
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_artifacts(&self, source_id: i64) -> Result<Vec<DownloadArtifact>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, source_id, byte_size, downloaded_at, success, rows_seen, rows_loaded
                 FROM artifacts WHERE source_id = ?1 ORDER BY downloaded_at DESC",
            )?;
            let rows = stmt
                .query_map(params![source_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(
                    |(path, source_id, byte_size, downloaded_at, success, rows_seen, rows_loaded)| {
                        Ok(DownloadArtifact {
                            path,
                            source_id,
                            byte_size,
                            downloaded_at: parse_utc(&downloaded_at)?,
                            success,
                            rows_seen,
                            rows_loaded,
                        })
                    },
                )
                .collect()
        })
    }

    // -- records ----------------------------------------------------------

    pub fn count_records(&self, source_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM records WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .map_err(Error::from)
        })
    }

    pub fn get_record(&self, identity: &str) -> Result<Option<NormalizedRecord>> {
        self.with_conn(|conn| record::get(conn, identity))
    }
}

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        base_url: row.get(3)?,
        driver_key: row.get(4)?,
        last_scraped_at: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        refresh_days: row.get(6)?,
    })
}

fn parse_utc(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Validation(format!("bad stored timestamp {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source(name: &str) -> Source {
        Source {
            id: 0,
            name: name.to_string(),
            short_name: name.to_lowercase().replace(' ', "_"),
            base_url: "https://example.gov/forecast".to_string(),
            driver_key: "generic".to_string(),
            last_scraped_at: None,
            refresh_days: Some(7),
        }
    }

    #[test]
    fn seeded_source_starts_pending() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_source(&sample_source("Agency A")).unwrap();
        let status = store.get_run_status(id).unwrap().unwrap();
        assert_eq!(status.state, RunState::Pending);
        assert_eq!(status.records_found, None);
    }

    #[test]
    fn reseeding_keeps_id_and_status() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_source(&sample_source("Agency A")).unwrap();
        store
            .set_run_status(id, RunState::Completed, "ok", Some(12))
            .unwrap();

        let mut updated = sample_source("Agency A");
        updated.base_url = "https://example.gov/v2".to_string();
        let id2 = store.upsert_source(&updated).unwrap();
        assert_eq!(id, id2);

        let src = store.get_source(id).unwrap().unwrap();
        assert_eq!(src.base_url, "https://example.gov/v2");
        let status = store.get_run_status(id).unwrap().unwrap();
        assert_eq!(status.state, RunState::Completed);
    }

    #[test]
    fn lookup_by_name_or_short_name() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_source(&sample_source("Agency A")).unwrap();
        assert!(store.get_source_by_name("Agency A").unwrap().is_some());
        assert!(store.get_source_by_name("agency_a").unwrap().is_some());
        assert!(store.get_source_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn detail_is_truncated() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_source(&sample_source("Agency A")).unwrap();
        let long = "x".repeat(DETAIL_MAX + 100);
        store
            .set_run_status(id, RunState::Failed, &long, None)
            .unwrap();
        let status = store.get_run_status(id).unwrap().unwrap();
        assert_eq!(status.detail.len(), DETAIL_MAX);
    }

    #[test]
    fn artifacts_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_source(&sample_source("Agency A")).unwrap();
        store
            .record_artifact(&DownloadArtifact {
                path: "/tmp/agency_a_20260801_120000.csv".to_string(),
                source_id: id,
                byte_size: 2048,
                downloaded_at: Utc::now(),
                success: true,
                rows_seen: Some(10),
                rows_loaded: Some(9),
            })
            .unwrap();
        let artifacts = store.list_artifacts(id).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].success);
        assert_eq!(artifacts[0].rows_loaded, Some(9));
    }
}
