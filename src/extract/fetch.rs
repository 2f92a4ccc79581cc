//! Direct authenticated download over reqwest.
//!
//! Not a browser, just one GET carrying the browser session's cookies. Retries
//! on 5xx and backs off on 429, then streams the body to the artifact path.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

const MAX_RETRIES: u32 = 2;

/// GET `url` with the given cookie pairs and write the body to `dest`.
/// Returns the byte size written.
pub async fn fetch_to_file(
    url: &str,
    cookies: &[(String, String)],
    dest: &Path,
    timeout: Duration,
) -> Result<u64> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
             AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/131.0.0.0 Safari/537.36",
        )
        .build()
        .map_err(|e| Error::Extraction(format!("http client: {e}")))?;

    let cookie_header = cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");

    let mut retries = 0u32;
    let body = loop {
        let mut request = client.get(url);
        if !cookie_header.is_empty() {
            request = request.header(reqwest::header::COOKIE, &cookie_header);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("GET {url}: {e}")))?;

        let status = response.status();
        if (status.is_server_error() || status.as_u16() == 429) && retries < MAX_RETRIES {
            retries += 1;
            let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
            debug!(url, status = status.as_u16(), retry = retries, "retrying fetch");
            tokio::time::sleep(delay).await;
            continue;
        }
        if !status.is_success() {
            return Err(Error::Extraction(format!("GET {url}: HTTP {status}")));
        }
        break response
            .bytes()
            .await
            .map_err(|e| Error::Extraction(format!("GET {url}: body read: {e}")))?;
    };

    tokio::fs::write(dest, &body).await?;
    Ok(body.len() as u64)
}
