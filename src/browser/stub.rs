//! Scripted in-memory driver for tests. No browser involved.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{BrowserSession, Driver};
use crate::error::{Error, Result};

/// Behavior knobs shared between a [`StubDriver`] and its sessions.
#[derive(Default)]
pub struct StubScript {
    pub fail_navigate: bool,
    pub fail_click: bool,
    /// File written into the download dir when a click lands.
    pub click_payload: Option<(&'static str, &'static str)>,
    pub download_dir: Mutex<Option<PathBuf>>,
    pub closes: AtomicUsize,
}

pub struct StubDriver {
    pub script: Arc<StubScript>,
}

struct StubSession {
    script: Arc<StubScript>,
}

#[async_trait]
impl Driver for StubDriver {
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(StubSession {
            script: Arc::clone(&self.script),
        }))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_sessions(&self) -> usize {
        0
    }
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<()> {
        if self.script.fail_navigate {
            return Err(Error::Navigation(format!("stubbed failure at {url}")));
        }
        Ok(())
    }
    async fn wait_for_selector(&self, _selector: &str, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }
    async fn click(&self, selector: &str, _timeout_ms: u64, _js: bool) -> Result<()> {
        if self.script.fail_click {
            return Err(Error::Extraction(format!(
                "stubbed click failure on {selector}"
            )));
        }
        if let Some((name, body)) = self.script.click_payload {
            let dir = self
                .script
                .download_dir
                .lock()
                .unwrap()
                .clone()
                .expect("download dir set before click");
            std::fs::write(dir.join(name), body).unwrap();
        }
        Ok(())
    }
    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        *self.script.download_dir.lock().unwrap() = Some(dir.to_path_buf());
        Ok(())
    }
    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![])
    }
    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }
    async fn page_source(&self) -> Result<String> {
        Ok("<html><body>stub</body></html>".to_string())
    }
    async fn current_url(&self) -> Result<String> {
        Ok("about:blank".to_string())
    }
    async fn close(self: Box<Self>) -> Result<()> {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
