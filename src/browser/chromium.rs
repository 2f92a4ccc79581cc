//! Chromium-based driver using chromiumoxide.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tracing::debug;

use super::{BrowserSession, Driver};
use crate::error::{Error, Result};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PROSPECT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PROSPECT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.prospect/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".prospect/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".prospect/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".prospect/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".prospect/chromium/chrome-linux64/chrome"),
                home.join(".prospect/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headless Chromium driver.
pub struct ChromiumDriver {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumDriver {
    /// Launch a headless Chromium instance. `explicit_path` (from
    /// configuration) wins over discovery.
    pub async fn launch(explicit_path: Option<&Path>) -> Result<Self> {
        let chrome_path = explicit_path
            .map(Path::to_path_buf)
            .or_else(find_chromium)
            .ok_or_else(|| {
                Error::Validation(
                    "Chromium not found; set PROSPECT_CHROMIUM_PATH or install google-chrome"
                        .to_string(),
                )
            })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| Error::Navigation(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Navigation(format!("failed to launch Chromium: {e}")))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        debug!("chromium launched");
        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Navigation(format!("failed to open page: {e}")))?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumSession {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser shuts down when the driver is dropped.
        Ok(())
    }

    fn active_sessions(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page session.
pub struct ChromiumSession {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumSession {
    async fn selector_present(&self, selector: &str) -> Result<bool> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| Error::Validation(format!("bad selector {selector:?}: {e}")))?;
        let script = format!("document.querySelector({quoted}) !== null");
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::Extraction(format!("selector probe failed: {e}")))?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Navigation(format!("goto {url}: {e}"))),
            Err(_) => Err(Error::Navigation(format!(
                "navigation to {url} timed out after {timeout_ms}ms"
            ))),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.selector_present(selector).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::InteractionTimeout(format!(
                    "selector {selector:?} not present after {timeout_ms}ms"
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn click(&self, selector: &str, timeout_ms: u64, js_fallback: bool) -> Result<()> {
        let native = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            let element = self
                .page
                .find_element(selector)
                .await
                .map_err(|e| Error::Extraction(format!("element {selector:?}: {e}")))?;
            element
                .click()
                .await
                .map_err(|e| Error::Extraction(format!("click {selector:?}: {e}")))?;
            Ok::<_, Error>(())
        })
        .await;

        match native {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) if !js_fallback => return Err(e),
            Err(_) if !js_fallback => {
                return Err(Error::InteractionTimeout(format!(
                    "click on {selector:?} timed out after {timeout_ms}ms"
                )))
            }
            _ => debug!(selector, "native click failed, retrying via script"),
        }

        let quoted = serde_json::to_string(selector)
            .map_err(|e| Error::Validation(format!("bad selector {selector:?}: {e}")))?;
        let script = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el) return false; el.click(); return true; }})()"
        );
        let clicked = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::Extraction(format!("scripted click {selector:?}: {e}")))?
            .into_value::<bool>()
            .unwrap_or(false);
        if clicked {
            Ok(())
        } else {
            Err(Error::Extraction(format!(
                "no element matched {selector:?} for scripted click"
            )))
        }
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
            .map_err(|e| Error::Extraction(format!("download behavior params: {e}")))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| Error::Extraction(format!("set download dir: {e}")))?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| Error::Extraction(format!("cookie read failed: {e}")))?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| Error::Extraction(format!("screenshot failed: {e}")))
    }

    async fn page_source(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| Error::Extraction(format!("page source read failed: {e}")))?;
        result
            .into_value()
            .map_err(|e| Error::Extraction(format!("page source not a string: {e:?}")))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| Error::Navigation(format!("url read failed: {e}")))?;
        Ok(url.map(|u| u.to_string()).unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
