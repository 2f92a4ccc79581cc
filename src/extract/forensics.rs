//! Failure forensics: screenshot and page dump on setup/extract failure.
//!
//! Capture is best effort. A failed capture is logged and discarded so it
//! cannot mask the error that triggered it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::browser::BrowserSession;

/// Save a screenshot and the page markup for a failed run. Returns the
/// paths written, skipping whichever captures failed.
pub async fn capture(
    session: &dyn BrowserSession,
    diagnostics_dir: &Path,
    short_name: &str,
) -> Vec<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut written = Vec::new();

    if let Err(e) = std::fs::create_dir_all(diagnostics_dir) {
        warn!(dir = %diagnostics_dir.display(), error = %e, "diagnostics dir unavailable");
        return written;
    }

    match session.screenshot().await {
        Ok(png) => {
            let path = diagnostics_dir.join(format!("{short_name}_{stamp}.png"));
            match std::fs::write(&path, png) {
                Ok(()) => written.push(path),
                Err(e) => warn!(error = %e, "screenshot write failed"),
            }
        }
        Err(e) => warn!(error = %e, "screenshot capture failed"),
    }

    match session.page_source().await {
        Ok(html) => {
            let path = diagnostics_dir.join(format!("{short_name}_{stamp}.html"));
            match std::fs::write(&path, html) {
                Ok(()) => written.push(path),
                Err(e) => warn!(error = %e, "page dump write failed"),
            }
        }
        Err(e) => warn!(error = %e, "page source capture failed"),
    }

    written
}
