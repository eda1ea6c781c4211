//! SQLite-backed [`VectorStore`] implementation.
//!
//! Documents and their embeddings live in a single `documents` row, so
//! replacing a row inside a transaction swaps content and vector together.
//! Search loads every candidate vector and ranks with
//! [`sentinel_core::search::rank`]; at watchlist scale a brute-force scan
//! is well within budget.
//!
//! The embedding dimension is recorded in `store_meta` the first time a
//! store is opened. Opening with a different dimension fails; the only
//! recovery is re-embedding into a fresh database.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use sentinel_core::embedding::{blob_to_vec, vec_to_blob};
use sentinel_core::error::{StoreQueryError, StoreWriteError};
use sentinel_core::models::{Document, QueryResult};
use sentinel_core::search::{rank, score};
use sentinel_core::store::{
    validate_batch, validate_query, SearchRequest, StoreStats, UpsertSummary, VectorStore,
};

use crate::config::Config;
use crate::db;
use crate::migrate;

const DIMS_KEY: &str = "embedding_dims";

/// SQLite's default host-parameter limit is 999; stay well below it.
const ID_LOOKUP_CHUNK: usize = 500;

/// SQLite implementation of [`VectorStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    /// Prepare the schema and bind the store to `dims`.
    pub async fn open(pool: SqlitePool, dims: usize) -> Result<Self> {
        migrate::migrate(&pool).await?;

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&pool)
                .await?;

        match recorded {
            Some(value) => {
                let stored: usize = value
                    .parse()
                    .with_context(|| format!("Corrupt store_meta value for {}: {}", DIMS_KEY, value))?;
                if stored != dims {
                    bail!(
                        "Database was initialized with {}-dimensional embeddings but embedding.dims is {}. \
                         Re-embed into a fresh database to change models.",
                        stored,
                        dims
                    );
                }
            }
            None => {
                sqlx::query("INSERT INTO store_meta (key, value) VALUES (?, ?)")
                    .bind(DIMS_KEY)
                    .bind(dims.to_string())
                    .execute(&pool)
                    .await?;
                tracing::info!(dims, "recorded embedding dimension");
            }
        }

        Ok(Self { pool, dims })
    }

    /// Connect to `[db].path` and open with `embedding.dims`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::open(pool, config.embedding.dims).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

fn write_err(e: sqlx::Error) -> StoreWriteError {
    StoreWriteError::Backend {
        transient: is_transient(&e),
        message: e.to_string(),
    }
}

fn query_err(e: sqlx::Error) -> StoreQueryError {
    StoreQueryError::Backend {
        transient: is_transient(&e),
        message: e.to_string(),
    }
}

fn ms_to_datetime(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid published_at: {}", ms).into()))
}

fn row_to_document(row: &SqliteRow) -> Result<Document, sqlx::Error> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    Ok(Document {
        id: row.try_get("id")?,
        ticker: row.try_get("ticker")?,
        headline: row.try_get("headline")?,
        content: row.try_get("content")?,
        published_at: ms_to_datetime(row.try_get("published_at")?)?,
        embedding: blob_to_vec(&blob),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn health_check(&self) -> Result<(), StoreQueryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn fingerprints(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, String>, StoreQueryError> {
        let mut found = HashMap::new();
        for chunk in ids.chunks(ID_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT id, fingerprint FROM documents WHERE id IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(&self.pool).await.map_err(query_err)?;
            for row in rows {
                let id: String = row.try_get("id").map_err(query_err)?;
                let fp: String = row.try_get("fingerprint").map_err(query_err)?;
                found.insert(id, fp);
            }
        }
        Ok(found)
    }

    async fn upsert(&self, docs: &[Document]) -> Result<UpsertSummary, StoreWriteError> {
        validate_batch(self.dims, docs)?;

        let now = Utc::now().timestamp_millis();
        let mut summary = UpsertSummary::default();
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        for doc in docs {
            let fingerprint = doc.fingerprint();
            let existing: Option<String> =
                sqlx::query_scalar("SELECT fingerprint FROM documents WHERE id = ?")
                    .bind(&doc.id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(write_err)?;

            match existing {
                Some(ref fp) if *fp == fingerprint => {
                    summary.unchanged += 1;
                    continue;
                }
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }

            sqlx::query(
                r#"
                INSERT INTO documents (id, ticker, headline, content, published_at,
                                       embedding, fingerprint, ingested_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    ticker = excluded.ticker,
                    headline = excluded.headline,
                    content = excluded.content,
                    published_at = excluded.published_at,
                    embedding = excluded.embedding,
                    fingerprint = excluded.fingerprint,
                    ingested_at = excluded.ingested_at
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.ticker)
            .bind(&doc.headline)
            .bind(&doc.content)
            .bind(doc.published_at.timestamp_millis())
            .bind(vec_to_blob(&doc.embedding))
            .bind(&fingerprint)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        Ok(summary)
    }

    async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<QueryResult>, StoreQueryError> {
        validate_query(self.dims, req)?;

        let rows = match req.ticker {
            Some(ticker) => sqlx::query(
                "SELECT id, ticker, headline, content, published_at, embedding \
                 FROM documents WHERE ticker = ?",
            )
            .bind(ticker)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT id, ticker, headline, content, published_at, embedding FROM documents",
            )
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(query_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let doc = row_to_document(row).map_err(query_err)?;
            candidates.push(score(req.query_embedding, &doc));
        }

        let results = rank(candidates, req.match_threshold, req.match_count);
        tracing::debug!(
            scanned = rows.len(),
            returned = results.len(),
            threshold = req.match_threshold,
            "vector search"
        );
        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreQueryError> {
        let row = sqlx::query(
            "SELECT id, ticker, headline, content, published_at, embedding FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.as_ref()
            .map(row_to_document)
            .transpose()
            .map_err(query_err)
    }

    async fn stats(&self) -> Result<StoreStats, StoreQueryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n, MAX(published_at) AS newest FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)?;

        let documents: i64 = row.try_get("n").map_err(query_err)?;
        let newest: Option<i64> = row.try_get("newest").map_err(query_err)?;

        Ok(StoreStats {
            documents: documents as usize,
            dims: self.dims,
            newest_published_at: newest
                .map(ms_to_datetime)
                .transpose()
                .map_err(query_err)?,
        })
    }
}
