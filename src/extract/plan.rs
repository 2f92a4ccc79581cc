//! Per-source extraction plans.
//!
//! A [`SourcePlan`] is the configuration half of a source: how to reach the
//! listing page, how to trigger the download, how to read the file, and the
//! rule set that normalizes it. Plans are serde documents keyed by the
//! source's `driver_key`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::ReadOptions;
use crate::transform::RuleSet;

/// Everything a run needs to know about one source, beyond the store row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePlan {
    /// Page to open in the setup phase; falls back to the source's base URL.
    #[serde(default)]
    pub start_url: Option<String>,

    /// Selector whose presence marks the page ready. No selector means
    /// navigation alone completes setup.
    #[serde(default)]
    pub ready_selector: Option<String>,

    /// How the extract phase obtains the file.
    pub download: DownloadPlan,

    /// Extension for the captured artifact (`csv`, `xlsx`, `html`).
    pub file_ext: String,

    /// How to read the artifact into a raw table.
    #[serde(default)]
    pub read: ReadOptions,

    /// The declarative transformation rules.
    pub rules: RuleSet,

    /// Reset enrichment columns on reload instead of preserving them.
    #[serde(default)]
    pub reset_enrichment: bool,
}

impl SourcePlan {
    /// Load the plan for a driver key from `plans_dir/{driver_key}.json`.
    pub fn load(plans_dir: &Path, driver_key: &str) -> Result<Self> {
        let path = plans_dir.join(format!("{driver_key}.json"));
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Validation(format!("no plan for driver {driver_key:?} at {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Validation(format!("plan {driver_key:?} is malformed: {e}")))
    }
}

/// How the extract phase gets the raw file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DownloadPlan {
    /// GET a known URL directly, reusing the browser session's cookies.
    DirectFetch { url: String },

    /// Drive the page through a sequence of waits and clicks until the
    /// browser itself downloads the file.
    Click { steps: Vec<ClickStep> },
}

/// One step of a click-sequence download. A step waits, clicks, or both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickStep {
    /// Selector to wait for before acting.
    #[serde(default)]
    pub wait_for: Option<String>,

    /// Selector to click.
    #[serde(default)]
    pub click: Option<String>,

    /// Per-step timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Retry a failed native click as a scripted `.click()`.
    #[serde(default)]
    pub js_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_plan_deserializes() {
        let json = r##"{
            "ready_selector": "table#forecast",
            "download": {
                "mode": "click",
                "steps": [
                    {"wait_for": "#export", "timeout_ms": 5000},
                    {"click": "#export", "js_fallback": true}
                ]
            },
            "file_ext": "xlsx",
            "read": {"format": "xlsx", "header_row": 1},
            "rules": {"dedup_fields": ["native_id"]}
        }"##;
        let plan: SourcePlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.file_ext, "xlsx");
        match &plan.download {
            DownloadPlan::Click { steps } => {
                assert_eq!(steps.len(), 2);
                assert!(steps[1].js_fallback);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn direct_fetch_plan_deserializes() {
        let json = r#"{
            "download": {"mode": "direct_fetch", "url": "https://example.gov/export.csv"},
            "file_ext": "csv",
            "rules": {}
        }"#;
        let plan: SourcePlan = serde_json::from_str(json).unwrap();
        assert!(matches!(plan.download, DownloadPlan::DirectFetch { .. }));
    }

    #[test]
    fn missing_plan_file_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourcePlan::load(dir.path(), "nope").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
