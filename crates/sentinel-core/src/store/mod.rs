//! Vector store abstraction for Sentinel.
//!
//! The [`VectorStore`] trait is the upsert/search contract shared by the
//! ingestion orchestrator and the query engine, enabling pluggable
//! backends (SQLite in the app crate, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Contract
//!
//! | Method | Guarantee |
//! |--------|-----------|
//! | [`upsert`](VectorStore::upsert) | keyed by `id`; content and embedding replaced together; a batch with any wrong-length embedding is rejected whole |
//! | [`search`](VectorStore::search) | at most `match_count` rows with similarity `> match_threshold`, ranked by [`crate::search::rank`] |
//! | [`fingerprints`](VectorStore::fingerprints) | stored content fingerprints for change detection |
//!
//! The embedding dimension is fixed when a store is created and checked
//! on every write and read.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{StoreQueryError, StoreWriteError};
use crate::models::{Document, QueryResult};

/// Inputs for a single nearest-neighbor search.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query_embedding: &'a [f32],
    /// Minimum similarity, exclusive.
    pub match_threshold: f32,
    /// Maximum number of results.
    pub match_count: usize,
    /// Restrict results to one (upper-cased) symbol.
    pub ticker: Option<&'a str>,
}

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Documents whose stored fingerprint already matched.
    pub unchanged: usize,
}

impl UpsertSummary {
    pub fn merge(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }

    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Store-wide counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub dims: usize,
    pub newest_published_at: Option<DateTime<Utc>>,
}

/// Abstract vector store for canonical documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embedding dimension fixed at store creation.
    fn dims(&self) -> usize;

    /// Cheap reachability probe; failure aborts an ingestion cycle.
    async fn health_check(&self) -> Result<(), StoreQueryError>;

    /// Stored fingerprints for the given ids. Unknown ids are absent.
    async fn fingerprints(&self, ids: &[String])
        -> Result<HashMap<String, String>, StoreQueryError>;

    /// Insert or replace documents by id.
    async fn upsert(&self, docs: &[Document]) -> Result<UpsertSummary, StoreWriteError>;

    /// Nearest-neighbor search by cosine similarity.
    async fn search(&self, req: &SearchRequest<'_>)
        -> Result<Vec<QueryResult>, StoreQueryError>;

    /// Retrieve one document, including its embedding.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreQueryError>;

    async fn stats(&self) -> Result<StoreStats, StoreQueryError>;
}

/// Reject a batch if any embedding has the wrong length.
///
/// Called before any write so a malformed vector never lands in the store.
pub fn validate_batch(dims: usize, docs: &[Document]) -> Result<(), StoreWriteError> {
    match docs.iter().find(|d| d.embedding.len() != dims) {
        Some(bad) => Err(StoreWriteError::DimensionMismatch {
            id: bad.id.clone(),
            expected: dims,
            actual: bad.embedding.len(),
        }),
        None => Ok(()),
    }
}

/// Check a search request against the store dimension.
pub fn validate_query(dims: usize, req: &SearchRequest<'_>) -> Result<(), StoreQueryError> {
    if req.query_embedding.len() != dims {
        return Err(StoreQueryError::DimensionMismatch {
            expected: dims,
            actual: req.query_embedding.len(),
        });
    }
    if req.match_threshold.is_nan() {
        return Err(StoreQueryError::InvalidParameters(
            "match_threshold is NaN".to_string(),
        ));
    }
    if req.match_count == 0 {
        return Err(StoreQueryError::InvalidParameters(
            "match_count must be >= 1".to_string(),
        ));
    }
    Ok(())
}
