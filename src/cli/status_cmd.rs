//! Show run status for one source or all of them.

use anyhow::{Context, Result};

use super::output;
use crate::config::Config;
use crate::store::{RunStatus, Source, Store};

pub async fn run(source_name: Option<&str>) -> Result<()> {
    let config = Config::from_env();
    let store = super::open_store(&config)?;

    let sources = match source_name {
        Some(name) => vec![store
            .get_source_by_name(name)?
            .with_context(|| format!("no source named {name:?}"))?],
        None => store.list_sources()?,
    };

    let mut rows: Vec<(Source, Option<RunStatus>)> = Vec::with_capacity(sources.len());
    for source in sources {
        let status = store.get_run_status(source.id)?;
        rows.push((source, status));
    }
    print_statuses(&store, &rows)?;
    Ok(())
}

fn print_statuses(store: &Store, rows: &[(Source, Option<RunStatus>)]) -> Result<()> {
    if output::is_json() {
        let lines: Vec<_> = rows
            .iter()
            .map(|(source, status)| {
                serde_json::json!({
                    "source": source.name,
                    "status": status,
                    "records": store.count_records(source.id).ok(),
                })
            })
            .collect();
        output::print_json(&lines);
        return Ok(());
    }

    for (source, status) in rows {
        match status {
            Some(s) => {
                let found = s
                    .records_found
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<30} {:<10} checked={} found={found} {}",
                    source.name,
                    s.state.as_str(),
                    s.checked_at.to_rfc3339(),
                    s.detail
                );
            }
            None => println!("{:<30} no status row", source.name),
        }
    }
    Ok(())
}
