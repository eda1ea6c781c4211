//! Document lookup by id.

use anyhow::{bail, Result};

use sentinel_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// `sentinel get <id>`: print one stored document.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let doc = store.get(id).await?;
    store.pool().close().await;

    let Some(doc) = doc else {
        bail!("document not found: {}", id);
    };

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("ticker:       {}", doc.ticker.as_deref().unwrap_or("(market)"));
    println!("headline:     {}", doc.headline);
    println!("published_at: {}", doc.published_at.to_rfc3339());
    println!("embedding:    {} dims", doc.embedding.len());
    println!("fingerprint:  {}", doc.fingerprint());
    println!();
    println!("{}", doc.content);
    Ok(())
}
