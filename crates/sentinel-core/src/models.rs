//! Data models that flow through the ingestion and retrieval pipeline.
//!
//! Raw items arrive from source feeds as [`RawItem`]s, become canonical
//! [`Document`]s after normalization and embedding, and come back out of
//! the vector store as ranked [`QueryResult`]s.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An item fetched from a source feed, before normalization.
///
/// Serialized with a `kind` tag so a single feed can mix price bars and
/// news articles:
///
/// ```json
/// {"kind": "news", "ticker": "AAPL", "headline": "Apple beats earnings",
///  "content": "...", "published_at": "2026-10-16T20:05:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawItem {
    Price(PriceItem),
    News(NewsItem),
}

/// A single OHLCV price bar for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<u64>,
    /// Start of the bar's interval.
    #[serde(default, alias = "timestamp")]
    pub start: Option<DateTime<Utc>>,
    /// Bar length label such as `1d` or `1h`.
    #[serde(default)]
    pub interval: Option<String>,
}

/// A news article or search hit about a symbol or the market at large.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Identifier assigned by the feed, when it has a stable one.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default, alias = "title")]
    pub headline: Option<String>,
    #[serde(default, alias = "body")]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "timestamp")]
    pub published_at: Option<DateTime<Utc>>,
}

impl RawItem {
    /// Timestamp used for recency-window filtering, if the item has one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            RawItem::Price(p) => p.start,
            RawItem::News(n) => n.published_at,
        }
    }

    /// Short human-readable label for failure reports.
    pub fn label(&self) -> String {
        match self {
            RawItem::Price(p) => format!(
                "price:{}@{}",
                p.ticker.as_deref().unwrap_or("?"),
                p.start
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "?".to_string())
            ),
            RawItem::News(n) => {
                let headline: String = n
                    .headline
                    .as_deref()
                    .unwrap_or("(no headline)")
                    .chars()
                    .take(60)
                    .collect();
                match &n.ticker {
                    Some(t) => format!("news:{}:{}", t, headline),
                    None => format!("news:{}", headline),
                }
            }
        }
    }
}

/// Canonical ingested unit, as persisted in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Stable identifier; the dedup key across ingestion cycles.
    pub id: String,
    /// Upper-cased symbol, `None` for general market news.
    pub ticker: Option<String>,
    pub headline: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    /// Empty until the document has been embedded.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl Document {
    /// Text handed to the embedder: headline and body joined as one passage.
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.headline.trim_end_matches('.'), self.content)
    }

    /// SHA-256 over every field except the embedding.
    ///
    /// Two normalizations of the same underlying event with identical
    /// text produce the same fingerprint, so re-ingestion can tell an
    /// unchanged document from an updated one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.ticker.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.headline.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.published_at.timestamp_millis().to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// A ranked search hit, produced per query and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub document_id: String,
    pub ticker: Option<String>,
    pub headline: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    /// `1 - cosine_distance`; higher is more relevant.
    pub similarity: f32,
}

impl QueryResult {
    pub fn from_document(doc: &Document, similarity: f32) -> Self {
        Self {
            document_id: doc.id.clone(),
            ticker: doc.ticker.clone(),
            headline: doc.headline.clone(),
            content: doc.content.clone(),
            published_at: doc.published_at,
            similarity,
        }
    }
}
