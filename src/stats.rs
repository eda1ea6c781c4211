//! Store statistics.
//!
//! `sentinel stats` prints document counts, the embedding dimension, and
//! a per-ticker breakdown with the newest publication and ingestion times,
//! enough to tell whether scheduled cycles are keeping the store fresh.

use anyhow::Result;
use sqlx::Row;

use sentinel_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

struct TickerStats {
    ticker: String,
    documents: i64,
    newest_published_ms: Option<i64>,
    last_ingested_ms: Option<i64>,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Sentinel Store Stats");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Dimensions:  {}", stats.dims);
    println!("  Documents:   {}", stats.documents);
    println!(
        "  Newest:      {}",
        stats
            .newest_published_at
            .map(|t| format_ms_relative(t.timestamp_millis()))
            .unwrap_or_else(|| "never".to_string())
    );

    let rows = sqlx::query(
        r#"
        SELECT COALESCE(ticker, '(market)') AS ticker,
               COUNT(*) AS documents,
               MAX(published_at) AS newest,
               MAX(ingested_at) AS ingested
        FROM documents
        GROUP BY ticker
        ORDER BY documents DESC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let mut by_ticker = Vec::with_capacity(rows.len());
    for row in &rows {
        by_ticker.push(TickerStats {
            ticker: row.try_get("ticker")?,
            documents: row.try_get("documents")?,
            newest_published_ms: row.try_get("newest")?,
            last_ingested_ms: row.try_get("ingested")?,
        });
    }

    if !by_ticker.is_empty() {
        println!();
        println!("  By ticker:");
        println!(
            "  {:<10} {:>6}   {:<18} {}",
            "TICKER", "DOCS", "NEWEST", "LAST INGEST"
        );
        println!("  {}", "-".repeat(56));
        for t in &by_ticker {
            println!(
                "  {:<10} {:>6}   {:<18} {}",
                t.ticker,
                t.documents,
                t.newest_published_ms
                    .map(format_ms_relative)
                    .unwrap_or_else(|| "-".to_string()),
                t.last_ingested_ms
                    .map(format_ms_relative)
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    println!();
    store.pool().close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Millisecond timestamp as "3 hours ago", or a date when older than a month.
fn format_ms_relative(ms: i64) -> String {
    let delta = (chrono::Utc::now().timestamp_millis() - ms) / 1000;
    if delta < 0 {
        return format_ms_iso(ms);
    }
    match delta {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(delta / 60, "min"),
        3600..=86_399 => plural(delta / 3600, "hour"),
        86_400..=2_591_999 => plural(delta / 86_400, "day"),
        _ => format_ms_iso(ms),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ms_iso(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}
