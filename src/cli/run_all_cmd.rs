//! Run every seeded source in sequence.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::output;
use crate::browser::ChromiumDriver;
use crate::config::Config;
use crate::events::EventBus;
use crate::orchestrate::{Orchestrator, RunDisposition};

pub async fn run(force: bool) -> Result<()> {
    let config = Config::from_env();
    let store = super::open_store(&config)?;

    let driver = ChromiumDriver::launch(config.chromium_path.as_deref())
        .await
        .context("browser launch failed")?;

    let bus = EventBus::default();
    let progress = tokio::spawn(super::run_cmd::print_events(bus.subscribe()));

    let orchestrator = Orchestrator::new(store, Arc::new(driver), config, bus);
    let reports = orchestrator.run_all(force).await?;
    progress.abort();

    let mut failures = 0usize;
    if output::is_json() {
        let lines: Vec<_> = reports
            .iter()
            .map(|r| {
                let (state, detail) = match &r.disposition {
                    RunDisposition::Loaded(o) => ("loaded", o.rows_loaded.to_string()),
                    RunDisposition::Fresh => ("fresh", String::new()),
                    RunDisposition::Failed(e) => {
                        failures += 1;
                        ("failed", e.to_string())
                    }
                };
                serde_json::json!({"source": r.source_name, "state": state, "detail": detail})
            })
            .collect();
        output::print_json(&lines);
    } else {
        for report in &reports {
            match &report.disposition {
                RunDisposition::Loaded(o) => {
                    println!("{}: loaded {} rows", report.source_name, o.rows_loaded)
                }
                RunDisposition::Fresh => {
                    println!("{}: fresh, skipped", report.source_name)
                }
                RunDisposition::Failed(e) => {
                    failures += 1;
                    println!("{}: FAILED ({e})", report.source_name)
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} sources failed", reports.len());
    }
    Ok(())
}
