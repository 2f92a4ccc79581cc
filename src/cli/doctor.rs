//! Environment readiness check.

use anyhow::Result;

use crate::browser::find_chromium;
use crate::config::Config;
use crate::store::Store;

/// Check Chromium availability, data dir writability, and the store.
pub async fn run() -> Result<()> {
    println!("Prospect Doctor");
    println!("===============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let config = Config::from_env();

    let chromium = config.chromium_path.clone().or_else(find_chromium);
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install google-chrome or set PROSPECT_CHROMIUM_PATH."
        ),
    }

    let dirs_ok = match config.ensure_dirs() {
        Ok(()) => {
            println!("[OK] Data dir writable: {}", config.data_dir.display());
            true
        }
        Err(e) => {
            println!("[!!] Data dir {} not writable: {e}", config.data_dir.display());
            false
        }
    };

    let store_ok = match Store::open(&config.db_path) {
        Ok(store) => {
            let n = store.list_sources().map(|s| s.len()).unwrap_or(0);
            println!("[OK] Store opens: {} ({n} sources)", config.db_path.display());
            true
        }
        Err(e) => {
            println!("[!!] Store at {} failed: {e}", config.db_path.display());
            false
        }
    };

    let plans_dir = config.plans_dir();
    let plan_count = std::fs::read_dir(&plans_dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0);
    if plan_count > 0 {
        println!("[OK] {plan_count} extraction plan(s) in {}", plans_dir.display());
    } else {
        println!("[??] No extraction plans in {}", plans_dir.display());
    }

    println!();
    if chromium.is_some() && dirs_ok && store_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
