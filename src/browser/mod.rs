//! Browser driver abstraction for the extraction machine.
//!
//! Defines the `Driver` and `BrowserSession` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide). One session maps to
//! one run and is torn down before the source lock releases.

pub mod chromium;
#[cfg(test)]
pub mod stub;

pub use chromium::{find_chromium, ChromiumDriver};

use async_trait::async_trait;

use crate::error::Result;

/// A browser engine that can open sessions.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a fresh session (tab) on a blank page.
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>>;
    /// Shut down the engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open sessions.
    fn active_sessions(&self) -> usize;
}

/// A single exclusive browser session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to a URL, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Wait until a CSS selector matches, bounded by `timeout_ms`.
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Click the first element matching a CSS selector. With `js_fallback`,
    /// a failed native click retries as a scripted `.click()` call.
    async fn click(&self, selector: &str, timeout_ms: u64, js_fallback: bool) -> Result<()>;

    /// Route subsequent downloads into `dir`.
    async fn set_download_dir(&self, dir: &std::path::Path) -> Result<()>;

    /// Current session cookies as name/value pairs, for authenticated
    /// direct fetches outside the browser.
    async fn cookies(&self) -> Result<Vec<(String, String)>>;

    /// Full-page PNG screenshot.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Serialized page markup.
    async fn page_source(&self) -> Result<String>;

    /// Current page URL.
    async fn current_url(&self) -> Result<String>;

    /// Close the session.
    async fn close(self: Box<Self>) -> Result<()>;
}
