//! Run orchestration: per-source locks, status transitions, and the public
//! `run_one` / `run_all` surface.
//!
//! The surface is async throughout; `run_one_blocking` is the one bridge for
//! synchronous callers. A source's status row is never left `Working` after a
//! call returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::Driver;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventBus, RunEvent};
use crate::extract::{ExtractionMachine, RunOutcome, SourcePlan};
use crate::store::{RunState, RunStatus, Source, Store};

/// Non-blocking per-source run locks, lazily created.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockRegistry {
    /// Try to take the lock for a source. `None` means a run is in flight.
    pub fn try_acquire(&self, source_id: i64) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(source_id).or_default())
        };
        lock.try_lock_owned().ok()
    }
}

/// Outcome of one source inside a `run_all` sweep.
#[derive(Debug)]
pub enum RunDisposition {
    /// Ran to completion.
    Loaded(RunOutcome),
    /// Skipped: scraped within its refresh window.
    Fresh,
    /// Ran and failed; the error is carried, not raised.
    Failed(Error),
}

/// Per-source result of a `run_all` sweep.
#[derive(Debug)]
pub struct RunReport {
    pub source_name: String,
    pub disposition: RunDisposition,
}

/// The engine's public entry point.
pub struct Orchestrator {
    store: Arc<Store>,
    driver: Arc<dyn Driver>,
    config: Config,
    bus: EventBus,
    locks: LockRegistry,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, driver: Arc<dyn Driver>, config: Config, bus: EventBus) -> Self {
        Self {
            store,
            driver,
            config,
            bus,
            locks: LockRegistry::default(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Run one source end to end. Fails fast with [`Error::AlreadyRunning`]
    /// when a run for the same source is in flight.
    pub async fn run_one(&self, source_id: i64) -> Result<RunOutcome> {
        let source = self
            .store
            .get_source(source_id)?
            .ok_or_else(|| Error::NotFound(format!("source id {source_id}")))?;

        let _guard = self
            .locks
            .try_acquire(source_id)
            .ok_or_else(|| Error::AlreadyRunning(source.name.clone()))?;

        let plan = SourcePlan::load(&self.config.plans_dir(), &source.driver_key)?;

        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        self.store
            .set_run_status(source_id, RunState::Working, "run in progress", None)?;
        self.bus.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            source: source.name.clone(),
            timestamp: Utc::now().to_rfc3339(),
        });
        info!(source = %source.name, run_id, "run started");

        let machine = ExtractionMachine::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.store),
            self.config.clone(),
            self.bus.clone(),
            run_id.clone(),
        );

        match machine.run(&source, &plan).await {
            Ok(outcome) => {
                self.store.set_run_status(
                    source_id,
                    RunState::Completed,
                    &format!("loaded {} records", outcome.rows_loaded),
                    Some(outcome.rows_loaded as i64),
                )?;
                self.store.touch_last_scraped(source_id, Utc::now())?;
                self.bus.emit(RunEvent::RunCompleted {
                    run_id,
                    source: source.name.clone(),
                    records_loaded: outcome.rows_loaded as u64,
                    total_ms: started.elapsed().as_millis() as u64,
                });
                Ok(outcome)
            }
            Err(e) => {
                // Status must land on Failed even when the write itself has
                // trouble; the original error always wins.
                if let Err(status_err) = self.store.set_run_status(
                    source_id,
                    RunState::Failed,
                    &format!("{}: {e}", e.kind()),
                    None,
                ) {
                    warn!(error = %status_err, "failed-status write failed");
                }
                Err(e)
            }
        }
    }

    /// Run every seeded source in turn. Failures are collected per source;
    /// this never raises. With `force`, refresh windows are ignored.
    pub async fn run_all(&self, force: bool) -> Result<Vec<RunReport>> {
        let sources = self.store.list_sources()?;
        let mut reports = Vec::with_capacity(sources.len());
        for source in sources {
            if !force && is_fresh(&source) {
                info!(source = %source.name, "skipping, inside refresh window");
                reports.push(RunReport {
                    source_name: source.name,
                    disposition: RunDisposition::Fresh,
                });
                continue;
            }
            let disposition = match self.run_one(source.id).await {
                Ok(outcome) => RunDisposition::Loaded(outcome),
                Err(e) => {
                    warn!(source = %source.name, error = %e, "run failed, continuing");
                    RunDisposition::Failed(e)
                }
            };
            reports.push(RunReport {
                source_name: source.name,
                disposition,
            });
        }
        Ok(reports)
    }

    /// Current status row for a source, if one exists.
    pub fn get_status(&self, source_id: i64) -> Result<Option<RunStatus>> {
        self.store.get_run_status(source_id)
    }

    /// Blocking facade over [`run_one`] for synchronous callers. Runs on a
    /// dedicated thread with its own runtime when called from inside an
    /// async context.
    ///
    /// [`run_one`]: Orchestrator::run_one
    pub fn run_one_blocking(&self, source_id: i64) -> Result<RunOutcome> {
        let block = || -> Result<RunOutcome> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(self.run_one(source_id))
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            std::thread::scope(|scope| match scope.spawn(block).join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
        } else {
            block()
        }
    }
}

fn is_fresh(source: &Source) -> bool {
    match (source.refresh_days, source.last_scraped_at) {
        (Some(days), Some(at)) => Utc::now() - at < ChronoDuration::days(i64::from(days)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::stub::{StubDriver, StubScript};
    use crate::table::ReadOptions;
    use crate::transform::RuleSet;
    use std::path::Path;
    use std::time::Duration;

    fn test_config(dir: &Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            db_path: dir.join("prospect.db"),
            downloads_root: dir.join("downloads"),
            diagnostics_dir: dir.join("diagnostics"),
            nav_timeout: Duration::from_secs(5),
            interaction_timeout: Duration::from_secs(2),
            download_timeout: Duration::from_secs(5),
            chromium_path: None,
        }
    }

    fn write_plan(config: &Config, driver_key: &str) {
        let mut rules = RuleSet::default();
        rules
            .rename
            .insert("Listing ID".to_string(), "native_id".to_string());
        rules.rename.insert("Title".to_string(), "title".to_string());
        rules.dedup_fields = vec!["native_id".into(), "title".into()];
        let plan = SourcePlan {
            start_url: None,
            ready_selector: None,
            download: crate::extract::DownloadPlan::Click {
                steps: vec![crate::extract::ClickStep {
                    wait_for: None,
                    click: Some("#export".to_string()),
                    timeout_ms: None,
                    js_fallback: false,
                }],
            },
            file_ext: "csv".to_string(),
            read: ReadOptions::default(),
            rules,
            reset_enrichment: false,
        };
        let dir = config.plans_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{driver_key}.json")),
            serde_json::to_string(&plan).unwrap(),
        )
        .unwrap();
    }

    fn seed(store: &Store, name: &str, driver_key: &str) -> Source {
        let mut source = Source {
            id: 0,
            name: name.to_string(),
            short_name: name.to_lowercase().replace(' ', "_"),
            base_url: "https://example.gov/forecast".to_string(),
            driver_key: driver_key.to_string(),
            last_scraped_at: None,
            refresh_days: None,
        };
        source.id = store.upsert_source(&source).unwrap();
        source
    }

    fn orchestrator(script: Arc<StubScript>, store: Arc<Store>, config: Config) -> Orchestrator {
        Orchestrator::new(
            store,
            Arc::new(StubDriver { script }),
            config,
            EventBus::default(),
        )
    }

    fn working_script() -> Arc<StubScript> {
        Arc::new(StubScript {
            click_payload: Some(("export.csv", "Listing ID,Title\n123,Road Study\n")),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn successful_run_completes_status_and_stamps_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let source = seed(&store, "Agency A", "agency_a");
        write_plan(&config, "agency_a");

        let orch = orchestrator(working_script(), Arc::clone(&store), config);
        let outcome = orch.run_one(source.id).await.unwrap();
        assert_eq!(outcome.rows_loaded, 1);

        let status = store.get_run_status(source.id).unwrap().unwrap();
        assert_eq!(status.state, RunState::Completed);
        assert_eq!(status.records_found, Some(1));
        assert!(store
            .get_source(source.id)
            .unwrap()
            .unwrap()
            .last_scraped_at
            .is_some());
    }

    #[tokio::test]
    async fn failed_run_lands_on_failed_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let source = seed(&store, "Agency A", "agency_a");
        write_plan(&config, "agency_a");

        let script = Arc::new(StubScript {
            fail_navigate: true,
            ..Default::default()
        });
        let orch = orchestrator(script, Arc::clone(&store), config);
        let err = orch.run_one(source.id).await.unwrap_err();
        assert_eq!(err.kind(), "navigation");

        let status = store.get_run_status(source.id).unwrap().unwrap();
        assert_eq!(status.state, RunState::Failed);
        assert!(status.detail.starts_with("navigation:"));
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let source = seed(&store, "Agency A", "agency_a");
        write_plan(&config, "agency_a");

        let orch = orchestrator(working_script(), store, config);
        let _held = orch.locks.try_acquire(source.id).unwrap();
        let err = orch.run_one(source.id).await.unwrap_err();
        assert_eq!(err.kind(), "already_running");
    }

    #[tokio::test]
    async fn unknown_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            working_script(),
            Arc::new(Store::open_in_memory().unwrap()),
            test_config(dir.path()),
        );
        let err = orch.run_one(999).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn run_all_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store, "Agency A", "agency_a");
        seed(&store, "Agency B", "no_plan_for_this_one");
        write_plan(&config, "agency_a");

        let orch = orchestrator(working_script(), Arc::clone(&store), config);
        let reports = orch.run_all(false).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].disposition, RunDisposition::Loaded(_)));
        assert!(matches!(reports[1].disposition, RunDisposition::Failed(_)));
    }

    #[tokio::test]
    async fn run_all_skips_fresh_sources_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut source = Source {
            id: 0,
            name: "Agency A".to_string(),
            short_name: "agency_a".to_string(),
            base_url: "https://example.gov/forecast".to_string(),
            driver_key: "agency_a".to_string(),
            last_scraped_at: None,
            refresh_days: Some(7),
        };
        source.id = store.upsert_source(&source).unwrap();
        store.touch_last_scraped(source.id, Utc::now()).unwrap();
        write_plan(&config, "agency_a");

        let orch = orchestrator(working_script(), Arc::clone(&store), config);
        let reports = orch.run_all(false).await.unwrap();
        assert!(matches!(reports[0].disposition, RunDisposition::Fresh));

        let reports = orch.run_all(true).await.unwrap();
        assert!(matches!(reports[0].disposition, RunDisposition::Loaded(_)));
    }

    #[test]
    fn blocking_facade_works_without_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let source = seed(&store, "Agency A", "agency_a");
        write_plan(&config, "agency_a");

        let orch = orchestrator(working_script(), Arc::clone(&store), config);
        let outcome = orch.run_one_blocking(source.id).unwrap();
        assert_eq!(outcome.rows_loaded, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_facade_bridges_from_async_context() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let source = seed(&store, "Agency A", "agency_a");
        write_plan(&config, "agency_a");

        let orch = orchestrator(working_script(), Arc::clone(&store), config);
        let outcome = orch.run_one_blocking(source.id).unwrap();
        assert_eq!(outcome.rows_loaded, 1);
    }
}
