//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! Documents live in a `HashMap` behind `std::sync::RwLock`. A document
//! and its embedding are swapped in as one value under the write lock, so
//! readers never observe a mismatched pair. Search is brute-force cosine
//! similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{StoreQueryError, StoreWriteError};
use crate::models::{Document, QueryResult};
use crate::search::{rank, score};

use super::{
    validate_batch, validate_query, SearchRequest, StoreStats, UpsertSummary, VectorStore,
};

struct StoredDoc {
    doc: Document,
    fingerprint: String,
}

/// In-memory vector store with a fixed embedding dimension.
pub struct InMemoryStore {
    dims: usize,
    docs: RwLock<HashMap<String, StoredDoc>>,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            docs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredDoc>>, StoreQueryError> {
        self.docs.read().map_err(|_| StoreQueryError::Backend {
            message: "in-memory store lock poisoned".to_string(),
            transient: false,
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredDoc>>, StoreWriteError> {
        self.docs.write().map_err(|_| StoreWriteError::Backend {
            message: "in-memory store lock poisoned".to_string(),
            transient: false,
        })
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn health_check(&self) -> Result<(), StoreQueryError> {
        self.read().map(|_| ())
    }

    async fn fingerprints(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, String>, StoreQueryError> {
        let docs = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                docs.get(id)
                    .map(|s| (id.clone(), s.fingerprint.clone()))
            })
            .collect())
    }

    async fn upsert(&self, batch: &[Document]) -> Result<UpsertSummary, StoreWriteError> {
        validate_batch(self.dims, batch)?;

        let mut summary = UpsertSummary::default();
        let mut docs = self.write()?;
        for doc in batch {
            let fingerprint = doc.fingerprint();
            match docs.get(&doc.id) {
                Some(existing) if existing.fingerprint == fingerprint => {
                    summary.unchanged += 1;
                    continue;
                }
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }
            docs.insert(
                doc.id.clone(),
                StoredDoc {
                    doc: doc.clone(),
                    fingerprint,
                },
            );
        }
        Ok(summary)
    }

    async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<QueryResult>, StoreQueryError> {
        validate_query(self.dims, req)?;

        let docs = self.read()?;
        let candidates = docs
            .values()
            .filter(|s| match req.ticker {
                Some(t) => s.doc.ticker.as_deref() == Some(t),
                None => true,
            })
            .map(|s| score(req.query_embedding, &s.doc));

        Ok(rank(candidates, req.match_threshold, req.match_count))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreQueryError> {
        Ok(self.read()?.get(id).map(|s| s.doc.clone()))
    }

    async fn stats(&self) -> Result<StoreStats, StoreQueryError> {
        let docs = self.read()?;
        Ok(StoreStats {
            documents: docs.len(),
            dims: self.dims,
            newest_published_at: docs.values().map(|s| s.doc.published_at).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, hour, 0, 0).unwrap()
    }

    fn doc(id: &str, ticker: Option<&str>, content: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: id.to_string(),
            ticker: ticker.map(String::from),
            headline: format!("headline {}", id),
            content: content.to_string(),
            published_at: at(12),
            embedding,
        }
    }

    fn req(q: &[f32], threshold: f32, count: usize) -> SearchRequest<'_> {
        SearchRequest {
            query_embedding: q,
            match_threshold: threshold,
            match_count: count,
            ticker: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new(2);
        let a = doc("A1", Some("AAPL"), "first", vec![1.0, 0.0]);

        let first = store.upsert(std::slice::from_ref(&a)).await.unwrap();
        assert_eq!(first.inserted, 1);

        let again = store.upsert(std::slice::from_ref(&a)).await.unwrap();
        assert_eq!(again.unchanged, 1);
        assert_eq!(again.written(), 0);

        let updated = doc("A1", Some("AAPL"), "updated", vec![0.0, 1.0]);
        let third = store.upsert(&[updated]).await.unwrap();
        assert_eq!(third.updated, 1);

        let stored = store.get("A1").await.unwrap().unwrap();
        assert_eq!(stored.content, "updated");
        assert_eq!(stored.embedding, vec![0.0, 1.0]);
        assert_eq!(store.stats().await.unwrap().documents, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_stores_nothing() {
        let store = InMemoryStore::new(2);
        let batch = vec![
            doc("good", None, "x", vec![1.0, 0.0]),
            doc("bad", None, "y", vec![1.0, 0.0, 0.0]),
        ];
        let err = store.upsert(&batch).await.unwrap_err();
        assert!(matches!(err, StoreWriteError::DimensionMismatch { .. }));
        assert_eq!(store.stats().await.unwrap().documents, 0);
    }

    #[tokio::test]
    async fn test_search_thresholds_and_ranks() {
        let store = InMemoryStore::new(2);
        store
            .upsert(&[
                doc("close", None, "", vec![1.0, 0.1]),
                doc("exact", None, "", vec![1.0, 0.0]),
                doc("far", None, "", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let q = [1.0, 0.0];
        let results = store.search(&req(&q, 0.5, 10)).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "close"]);
        assert!(results.iter().all(|r| r.similarity > 0.5));
    }

    #[tokio::test]
    async fn test_search_ticker_filter() {
        let store = InMemoryStore::new(2);
        store
            .upsert(&[
                doc("a", Some("AAPL"), "", vec![1.0, 0.0]),
                doc("n", Some("NVDA"), "", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let q = [1.0, 0.0];
        let mut r = req(&q, 0.0, 10);
        r.ticker = Some("NVDA");
        let results = store.search(&r).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "n");
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_dimension() {
        let store = InMemoryStore::new(2);
        let q = [1.0, 0.0, 0.0];
        let err = store.search(&req(&q, 0.0, 3)).await.unwrap_err();
        assert!(matches!(err, StoreQueryError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty() {
        let store = InMemoryStore::new(2);
        let q = [1.0, 0.0];
        assert!(store.search(&req(&q, 0.3, 3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fingerprints_only_known_ids() {
        let store = InMemoryStore::new(2);
        let a = doc("a", None, "x", vec![1.0, 0.0]);
        store.upsert(std::slice::from_ref(&a)).await.unwrap();

        let fps = store
            .fingerprints(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps.get("a"), Some(&a.fingerprint()));
    }
}
