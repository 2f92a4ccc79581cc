//! Runtime configuration, resolved from environment variables with
//! `~/.prospect/` defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Resolved runtime configuration shared by the store, the extraction
/// machine, and the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (`~/.prospect` by default).
    pub data_dir: PathBuf,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Root for raw downloads, one subdirectory per source.
    pub downloads_root: PathBuf,
    /// Where failure screenshots and page dumps land.
    pub diagnostics_dir: PathBuf,
    /// Navigation timeout for the setup phase.
    pub nav_timeout: Duration,
    /// Default timeout for element waits and clicks.
    pub interaction_timeout: Duration,
    /// Timeout for a triggered download to materialize on disk.
    pub download_timeout: Duration,
    /// Explicit Chromium binary path, if configured.
    pub chromium_path: Option<PathBuf>,
}

impl Config {
    /// Resolve configuration from the environment.
    ///
    /// `PROSPECT_DATA_DIR` overrides the root; individual paths hang off it.
    /// Timeouts accept milliseconds via `PROSPECT_NAV_TIMEOUT_MS`,
    /// `PROSPECT_INTERACTION_TIMEOUT_MS`, `PROSPECT_DOWNLOAD_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("PROSPECT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".prospect")
            });

        let chromium_path = std::env::var("PROSPECT_CHROMIUM_PATH")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.exists());

        Self {
            db_path: data_dir.join("prospect.db"),
            downloads_root: data_dir.join("downloads"),
            diagnostics_dir: data_dir.join("diagnostics"),
            nav_timeout: env_ms("PROSPECT_NAV_TIMEOUT_MS", 30_000),
            interaction_timeout: env_ms("PROSPECT_INTERACTION_TIMEOUT_MS", 15_000),
            download_timeout: env_ms("PROSPECT_DOWNLOAD_TIMEOUT_MS", 60_000),
            chromium_path,
            data_dir,
        }
    }

    /// Directory holding per-driver extraction plans.
    pub fn plans_dir(&self) -> PathBuf {
        self.data_dir.join("plans")
    }

    /// Create the data, downloads, and diagnostics directories if absent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.downloads_root)?;
        std::fs::create_dir_all(&self.diagnostics_dir)?;
        Ok(())
    }
}

fn env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hang_off_data_dir() {
        let cfg = Config::from_env();
        assert!(cfg.db_path.starts_with(&cfg.data_dir));
        assert!(cfg.downloads_root.starts_with(&cfg.data_dir));
        assert!(cfg.diagnostics_dir.starts_with(&cfg.data_dir));
    }

    #[test]
    fn timeout_defaults_are_sane() {
        let cfg = Config::from_env();
        assert!(cfg.nav_timeout >= Duration::from_secs(1));
        assert!(cfg.download_timeout >= cfg.interaction_timeout);
    }
}
