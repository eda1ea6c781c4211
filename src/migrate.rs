//! Schema creation.
//!
//! Idempotent: every statement uses `IF NOT EXISTS`, so `sentinel init`
//! can run any number of times.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Create the schema and record the configured embedding dimension.
///
/// Fails if the database was initialized with a different dimension.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    store.pool().close().await;
    Ok(())
}

/// Create tables and indexes on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            ticker TEXT,
            headline TEXT NOT NULL,
            content TEXT NOT NULL,
            published_at INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            fingerprint TEXT NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_ticker ON documents(ticker)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_published_at ON documents(published_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
