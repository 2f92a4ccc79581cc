//! Three-phase extraction state machine.
//!
//! `idle → setup → extract → process → {success | failed}`. One machine per
//! run; the machine is consumed by [`ExtractionMachine::run`] and cannot be
//! reused. The browser session is torn down exactly once on every path, and
//! setup/extract failures capture forensics before surfacing.

pub mod fetch;
pub mod forensics;
pub mod plan;

pub use plan::{ClickStep, DownloadPlan, SourcePlan};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::browser::{BrowserSession, Driver};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventBus, RunEvent, RunPhase};
use crate::store::{DownloadArtifact, Source, Store};
use crate::table::read_artifact;
use crate::transform::transform;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub artifact_path: PathBuf,
    pub rows_seen: usize,
    pub rows_loaded: usize,
}

/// One run's state machine. Constructed per run and consumed by [`run`].
///
/// [`run`]: ExtractionMachine::run
pub struct ExtractionMachine {
    driver: Arc<dyn Driver>,
    store: Arc<Store>,
    config: Config,
    bus: EventBus,
    run_id: String,
}

impl ExtractionMachine {
    pub fn new(
        driver: Arc<dyn Driver>,
        store: Arc<Store>,
        config: Config,
        bus: EventBus,
        run_id: String,
    ) -> Self {
        Self {
            driver,
            store,
            config,
            bus,
            run_id,
        }
    }

    /// Drive the machine through all three phases for one source.
    pub async fn run(self, source: &Source, plan: &SourcePlan) -> Result<RunOutcome> {
        // -- setup ---------------------------------------------------------
        let phase_start = self.phase_started(RunPhase::Setup);
        // setup() captures forensics and tears down internally on failure.
        let mut session = match self.setup(source, plan).await {
            Ok(session) => session,
            Err(e) => {
                self.run_failed(source, RunPhase::Setup, &e);
                return Err(e);
            }
        };
        self.phase_completed(RunPhase::Setup, phase_start);

        // -- extract -------------------------------------------------------
        let phase_start = self.phase_started(RunPhase::Extract);
        let artifact_path = match self.extract(session.as_mut(), source, plan).await {
            Ok(path) => path,
            Err(e) => {
                self.fail(session, source, RunPhase::Extract).await;
                self.run_failed(source, RunPhase::Extract, &e);
                return Err(e);
            }
        };
        self.phase_completed(RunPhase::Extract, phase_start);

        // The browser's work is done; tear it down before the slow part.
        teardown(session).await;

        // -- process -------------------------------------------------------
        let phase_start = self.phase_started(RunPhase::Process);
        let outcome = match self.process(source, plan, &artifact_path) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_artifact(source, &artifact_path, false, None, None);
                self.run_failed(source, RunPhase::Process, &e);
                return Err(e);
            }
        };
        self.phase_completed(RunPhase::Process, phase_start);

        self.record_artifact(
            source,
            &artifact_path,
            true,
            Some(outcome.rows_seen as i64),
            Some(outcome.rows_loaded as i64),
        );
        info!(
            source = %source.name,
            rows = outcome.rows_loaded,
            artifact = %outcome.artifact_path.display(),
            "run succeeded"
        );
        Ok(outcome)
    }

    async fn setup(&self, source: &Source, plan: &SourcePlan) -> Result<Box<dyn BrowserSession>> {
        let mut session = self.driver.new_session().await?;
        let url = plan.start_url.as_deref().unwrap_or(&source.base_url);

        let nav_ms = self.config.nav_timeout.as_millis() as u64;
        if let Err(e) = session.navigate(url, nav_ms).await {
            self.fail(session, source, RunPhase::Setup).await;
            return Err(e);
        }

        if let Some(selector) = &plan.ready_selector {
            let wait_ms = self.config.interaction_timeout.as_millis() as u64;
            if let Err(e) = session.wait_for_selector(selector, wait_ms).await {
                self.fail(session, source, RunPhase::Setup).await;
                return Err(e);
            }
        }

        Ok(session)
    }

    async fn extract(
        &self,
        session: &mut dyn BrowserSession,
        source: &Source,
        plan: &SourcePlan,
    ) -> Result<PathBuf> {
        let source_dir = self.config.downloads_root.join(&source.short_name);
        std::fs::create_dir_all(&source_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let artifact_path =
            source_dir.join(format!("{}_{stamp}.{}", source.short_name, plan.file_ext));

        let byte_size = match &plan.download {
            DownloadPlan::DirectFetch { url } => {
                let cookies = session.cookies().await.unwrap_or_else(|e| {
                    warn!(error = %e, "cookie read failed, fetching anonymously");
                    Vec::new()
                });
                fetch::fetch_to_file(url, &cookies, &artifact_path, self.config.download_timeout)
                    .await?
            }
            DownloadPlan::Click { steps } => {
                session.set_download_dir(&source_dir).await?;
                let before = dir_snapshot(&source_dir)?;
                for step in steps {
                    self.run_step(session, step).await?;
                }
                let downloaded = wait_for_download(
                    &source_dir,
                    &before,
                    self.config.download_timeout,
                )
                .await?;
                if downloaded != artifact_path {
                    std::fs::rename(&downloaded, &artifact_path)?;
                }
                std::fs::metadata(&artifact_path)?.len()
            }
        };

        self.bus.emit(RunEvent::DownloadCaptured {
            run_id: self.run_id.clone(),
            path: artifact_path.display().to_string(),
            byte_size,
        });
        Ok(artifact_path)
    }

    async fn run_step(&self, session: &dyn BrowserSession, step: &ClickStep) -> Result<()> {
        let timeout_ms = step
            .timeout_ms
            .unwrap_or(self.config.interaction_timeout.as_millis() as u64);
        if let Some(selector) = &step.wait_for {
            session.wait_for_selector(selector, timeout_ms).await?;
        }
        if let Some(selector) = &step.click {
            session.click(selector, timeout_ms, step.js_fallback).await?;
        }
        Ok(())
    }

    fn process(
        &self,
        source: &Source,
        plan: &SourcePlan,
        artifact_path: &Path,
    ) -> Result<RunOutcome> {
        let raw = read_artifact(artifact_path, &plan.read)?;
        let rows_seen = raw.len();
        let normalized = transform(&raw, &plan.rules);
        let rows_loaded = crate::identity::load(
            &self.store,
            source,
            &normalized,
            &plan.rules,
            !plan.reset_enrichment,
        )?;
        Ok(RunOutcome {
            artifact_path: artifact_path.to_path_buf(),
            rows_seen,
            rows_loaded,
        })
    }

    /// Capture forensics and tear the session down. Used on setup/extract
    /// failure; the caller still surfaces the original error.
    async fn fail(&self, session: Box<dyn BrowserSession>, source: &Source, phase: RunPhase) {
        let captured = forensics::capture(
            session.as_ref(),
            &self.config.diagnostics_dir,
            &source.short_name,
        )
        .await;
        for path in &captured {
            info!(phase = %phase, path = %path.display(), "forensic capture saved");
        }
        teardown(session).await;
    }

    fn record_artifact(
        &self,
        source: &Source,
        path: &Path,
        success: bool,
        rows_seen: Option<i64>,
        rows_loaded: Option<i64>,
    ) {
        let byte_size = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
        let artifact = DownloadArtifact {
            path: path.display().to_string(),
            source_id: source.id,
            byte_size,
            downloaded_at: Utc::now(),
            success,
            rows_seen,
            rows_loaded,
        };
        if let Err(e) = self.store.record_artifact(&artifact) {
            warn!(error = %e, "artifact bookkeeping failed");
        }
    }

    fn run_failed(&self, source: &Source, phase: RunPhase, error: &Error) {
        self.bus.emit(RunEvent::RunFailed {
            run_id: self.run_id.clone(),
            source: source.name.clone(),
            phase,
            error: error.to_string(),
        });
    }

    fn phase_started(&self, phase: RunPhase) -> Instant {
        self.bus.emit(RunEvent::PhaseStarted {
            run_id: self.run_id.clone(),
            phase,
        });
        Instant::now()
    }

    fn phase_completed(&self, phase: RunPhase, started: Instant) {
        self.bus.emit(RunEvent::PhaseCompleted {
            run_id: self.run_id.clone(),
            phase,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }
}

async fn teardown(session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "session close failed");
    }
}

fn dir_snapshot(dir: &Path) -> Result<HashMap<PathBuf, u64>> {
    let mut seen = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        seen.insert(entry.path(), entry.metadata()?.len());
    }
    Ok(seen)
}

/// Wait for a new, fully written file to appear under `dir`. A candidate
/// counts once its size holds steady across two polls and it has no
/// in-progress suffix.
async fn wait_for_download(
    dir: &Path,
    before: &HashMap<PathBuf, u64>,
    timeout: std::time::Duration,
) -> Result<PathBuf> {
    const POLL: std::time::Duration = std::time::Duration::from_millis(300);
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_sizes: HashMap<PathBuf, u64> = HashMap::new();

    loop {
        for (path, size) in dir_snapshot(dir)? {
            if before.contains_key(&path) || is_partial(&path) {
                continue;
            }
            if last_sizes.get(&path) == Some(&size) {
                return Ok(path);
            }
            last_sizes.insert(path, size);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::InteractionTimeout(format!(
                "no download appeared in {} within {}ms",
                dir.display(),
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(POLL).await;
    }
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("crdownload") | Some("tmp") | Some("part")
    )
}
