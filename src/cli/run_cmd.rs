//! Run a single source end to end.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use super::output;
use crate::browser::ChromiumDriver;
use crate::config::Config;
use crate::events::{EventBus, RunEvent};
use crate::orchestrate::Orchestrator;

/// Resolve the source by name or short name and run it.
pub async fn run(source_name: &str) -> Result<()> {
    let config = Config::from_env();
    let store = super::open_store(&config)?;

    let source = store
        .get_source_by_name(source_name)?
        .with_context(|| format!("no source named {source_name:?}; see `prospect sources`"))?;

    let driver = ChromiumDriver::launch(config.chromium_path.as_deref())
        .await
        .context("browser launch failed")?;

    let bus = EventBus::default();
    let progress = tokio::spawn(print_events(bus.subscribe()));

    let orchestrator = Orchestrator::new(store, Arc::new(driver), config, bus);
    let result = orchestrator.run_one(source.id).await;
    progress.abort();

    match result {
        Ok(outcome) => {
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "source": source.name,
                    "rows_seen": outcome.rows_seen,
                    "rows_loaded": outcome.rows_loaded,
                    "artifact": outcome.artifact_path.display().to_string(),
                }));
            } else {
                println!(
                    "{}: loaded {} of {} rows ({})",
                    source.name,
                    outcome.rows_loaded,
                    outcome.rows_seen,
                    outcome.artifact_path.display()
                );
            }
            Ok(())
        }
        Err(e) => bail!("run for {:?} failed: {e}", source.name),
    }
}

/// Stream run events to stderr as progress lines (or JSON lines).
pub(super) async fn print_events(mut rx: tokio::sync::broadcast::Receiver<RunEvent>) {
    while let Ok(event) = rx.recv().await {
        if output::is_json() {
            output::print_json(&event);
            continue;
        }
        match event {
            RunEvent::RunStarted { source, .. } => eprintln!("  {source}: starting"),
            RunEvent::PhaseStarted { phase, .. } => eprintln!("    phase {phase}"),
            RunEvent::PhaseCompleted {
                phase, elapsed_ms, ..
            } => eprintln!("    phase {phase} done in {elapsed_ms}ms"),
            RunEvent::DownloadCaptured { path, byte_size, .. } => {
                eprintln!("    captured {path} ({byte_size} bytes)")
            }
            RunEvent::RunCompleted {
                source,
                records_loaded,
                total_ms,
                ..
            } => eprintln!("  {source}: {records_loaded} records in {total_ms}ms"),
            RunEvent::RunFailed {
                source,
                phase,
                error,
                ..
            } => eprintln!("  {source}: failed during {phase}: {error}"),
        }
    }
}
