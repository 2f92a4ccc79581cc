//! CLI subcommand implementations for the prospect binary.

pub mod doctor;
pub mod output;
pub mod run_all_cmd;
pub mod run_cmd;
pub mod seed_cmd;
pub mod sources_cmd;
pub mod status_cmd;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::store::Store;

/// Open the store for a command, creating directories on first use.
pub fn open_store(config: &Config) -> Result<Arc<Store>> {
    config
        .ensure_dirs()
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;
    let store = Store::open(&config.db_path)
        .with_context(|| format!("cannot open store at {}", config.db_path.display()))?;
    Ok(Arc::new(store))
}
