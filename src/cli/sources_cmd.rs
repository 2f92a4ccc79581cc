//! List seeded sources.

use anyhow::Result;

use super::output;
use crate::config::Config;

pub async fn run() -> Result<()> {
    let config = Config::from_env();
    let store = super::open_store(&config)?;
    let sources = store.list_sources()?;

    if output::is_json() {
        output::print_json(&sources);
        return Ok(());
    }

    if sources.is_empty() {
        println!("no sources seeded; run `prospect seed <file.json>`");
        return Ok(());
    }
    for source in sources {
        let scraped = source
            .last_scraped_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:>4}  {:<30} driver={:<16} last_scraped={scraped}",
            source.id, source.name, source.driver_key
        );
    }
    Ok(())
}
