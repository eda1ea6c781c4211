//! Ingestion cycle orchestration.
//!
//! One cycle runs: fetch → window filter → normalize → dedup →
//! change detection → embed → upsert. Failures of single items (a
//! malformed record, a failed embedding, a rejected upsert chunk) are
//! recorded in the [`CycleReport`] and the cycle carries on; only an
//! unreachable store aborts it.
//!
//! Cycles are idempotent: documents are keyed by their deterministic id,
//! and documents whose stored fingerprint already matches are neither
//! re-embedded nor rewritten.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use sentinel_core::embedding::Embedder;
use sentinel_core::error::StoreQueryError;
use sentinel_core::models::Document;
use sentinel_core::normalize::normalize;
use sentinel_core::store::VectorStore;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::retry::call_with_retry;
use crate::sources::{build_sources, FetchWindow, ItemErrorKind, Source};
use crate::sqlite_store::SqliteStore;

/// The cycle could not run at all.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(StoreQueryError),
}

/// Knobs for one cycle, usually taken from `[ingest]` and `[embedding]`.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// How far back from cycle start items are accepted.
    pub window: chrono::Duration,
    pub watchlist: Vec<String>,
    /// Concurrent embedding requests.
    pub workers: usize,
    pub upsert_batch_size: usize,
    pub fetch_timeout: Duration,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
    pub max_retries: u32,
}

impl CycleOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: chrono::Duration::hours(config.ingest.window_hours),
            watchlist: config.ingest.watchlist.clone(),
            workers: config.ingest.workers,
            upsert_batch_size: config.ingest.upsert_batch_size,
            fetch_timeout: Duration::from_secs(config.ingest.timeout_secs),
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            store_timeout: Duration::from_secs(config.ingest.timeout_secs),
            max_retries: config.embedding.max_retries,
        }
    }
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            window: chrono::Duration::hours(24),
            watchlist: ["NVDA", "TSLA", "AAPL", "AMD", "MSFT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            workers: 4,
            upsert_batch_size: 32,
            fetch_timeout: Duration::from_secs(30),
            embed_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(30),
            max_retries: 1,
        }
    }
}

/// Pipeline stage at which an item was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Decode,
    Normalize,
    Embed,
    Upsert,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Decode => "decode",
            FailureStage::Normalize => "normalize",
            FailureStage::Embed => "embed",
            FailureStage::Upsert => "upsert",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub stage: FailureStage,
    /// Source name, record position, or document label.
    pub item: String,
    pub message: String,
}

/// Counts and failures for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Records received from sources, including malformed ones.
    pub fetched: usize,
    /// Items older than the recency window.
    pub stale: usize,
    /// Items collapsed into another item with the same id.
    pub duplicates: usize,
    /// Documents already stored with the same fingerprint.
    pub unchanged: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<ItemFailure>,
}

impl CycleReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Documents that are in the store and current after the cycle.
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    fn fail(&mut self, stage: FailureStage, item: impl Into<String>, message: impl Into<String>) {
        let failure = ItemFailure {
            stage,
            item: item.into(),
            message: message.into(),
        };
        tracing::warn!(
            stage = %failure.stage,
            item = %failure.item,
            error = %failure.message,
            "item failed"
        );
        self.failures.push(failure);
    }
}

/// Run one ingestion cycle against `store`.
///
/// `now` is the cycle start; the recency window is measured back from it.
pub async fn run_cycle(
    sources: &[Box<dyn Source>],
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    opts: &CycleOptions,
    now: DateTime<Utc>,
) -> Result<CycleReport, IngestError> {
    call_with_retry("store health check", opts.store_timeout, opts.max_retries, || {
        store.health_check()
    })
    .await
    .map_err(IngestError::StoreUnavailable)?;

    let mut report = CycleReport::default();
    let docs = collect_documents(sources, opts, now, &mut report).await;

    let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
    let stored = match call_with_retry("fingerprint lookup", opts.store_timeout, opts.max_retries, || {
        store.fingerprints(&ids)
    })
    .await
    {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, "fingerprint lookup failed, embedding every document");
            HashMap::new()
        }
    };

    let (unchanged, pending): (Vec<Document>, Vec<Document>) = docs
        .into_iter()
        .partition(|d| stored.get(&d.id) == Some(&d.fingerprint()));
    report.unchanged += unchanged.len();

    let results: Vec<_> = stream::iter(pending)
        .map(|doc| async move {
            let text = doc.embedding_text();
            let result = call_with_retry("embed", opts.embed_timeout, opts.max_retries, || {
                embedder.embed(&text)
            })
            .await;
            (doc, result)
        })
        .buffer_unordered(opts.workers.max(1))
        .collect()
        .await;

    let mut embedded = Vec::with_capacity(results.len());
    for (doc, result) in results {
        match result {
            Ok(vector) => embedded.push(doc.with_embedding(vector)),
            Err(e) => report.fail(FailureStage::Embed, describe(&doc), e.to_string()),
        }
    }
    embedded.sort_by(|a, b| a.id.cmp(&b.id));

    for chunk in embedded.chunks(opts.upsert_batch_size.max(1)) {
        match call_with_retry("upsert", opts.store_timeout, opts.max_retries, || {
            store.upsert(chunk)
        })
        .await
        {
            Ok(summary) => {
                report.inserted += summary.inserted;
                report.updated += summary.updated;
                report.unchanged += summary.unchanged;
            }
            Err(e) => {
                let message = e.to_string();
                for doc in chunk {
                    report.fail(FailureStage::Upsert, describe(doc), message.clone());
                }
            }
        }
    }

    tracing::info!(
        fetched = report.fetched,
        stale = report.stale,
        duplicates = report.duplicates,
        unchanged = report.unchanged,
        inserted = report.inserted,
        updated = report.updated,
        failed = report.failed(),
        "ingestion cycle complete"
    );
    Ok(report)
}

/// Fetch and normalize without embedding or writing.
pub async fn preview_cycle(
    sources: &[Box<dyn Source>],
    opts: &CycleOptions,
    now: DateTime<Utc>,
) -> (CycleReport, Vec<Document>) {
    let mut report = CycleReport::default();
    let docs = collect_documents(sources, opts, now, &mut report).await;
    (report, docs)
}

async fn collect_documents(
    sources: &[Box<dyn Source>],
    opts: &CycleOptions,
    now: DateTime<Utc>,
    report: &mut CycleReport,
) -> Vec<Document> {
    let window = FetchWindow {
        start: now - opts.window,
        end: now,
        watchlist: opts.watchlist.clone(),
    };
    let mut latest: HashMap<String, Document> = HashMap::new();

    for source in sources {
        let requests = source.request_count(&window).max(1) as u32;
        let deadline = opts.fetch_timeout * requests;
        let items = match tokio::time::timeout(deadline, source.fetch(&window)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                report.fail(FailureStage::Fetch, source.name(), format!("{:#}", e));
                continue;
            }
            Err(_) => {
                report.fail(
                    FailureStage::Fetch,
                    source.name(),
                    format!("timed out after {}s", deadline.as_secs()),
                );
                continue;
            }
        };
        tracing::debug!(source = source.name(), items = items.len(), "fetched");

        for item in items {
            report.fetched += 1;
            let raw = match item {
                Ok(raw) => raw,
                Err(bad) => {
                    let stage = match bad.kind {
                        ItemErrorKind::Fetch => FailureStage::Fetch,
                        ItemErrorKind::Decode => FailureStage::Decode,
                    };
                    report.fail(
                        stage,
                        format!("{}:{}", source.name(), bad.label),
                        bad.message,
                    );
                    continue;
                }
            };

            if matches!(raw.timestamp(), Some(ts) if ts < window.start) {
                report.stale += 1;
                continue;
            }

            let doc = match normalize(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    report.fail(FailureStage::Normalize, raw.label(), e.to_string());
                    continue;
                }
            };

            match latest.entry(doc.id.clone()) {
                Entry::Occupied(mut slot) => {
                    report.duplicates += 1;
                    if doc.published_at > slot.get().published_at {
                        slot.insert(doc);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(doc);
                }
            }
        }
    }

    let mut docs: Vec<Document> = latest.into_values().collect();
    docs.sort_by(|a, b| a.id.cmp(&b.id));
    docs
}

fn describe(doc: &Document) -> String {
    let headline: String = doc.headline.chars().take(60).collect();
    match &doc.ticker {
        Some(t) => format!("{}: {}", t, headline),
        None => headline,
    }
}

/// `sentinel ingest`: run one cycle over every configured source and print
/// the report.
pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let sources = build_sources(config)?;
    if sources.is_empty() {
        println!("No sources configured. Add [[sources]] entries to the config file.");
        return Ok(());
    }

    let opts = CycleOptions::from_config(config);
    let now = Utc::now();

    if dry_run {
        let (report, docs) = preview_cycle(&sources, &opts, now).await;
        println!(
            "ingest (dry-run, window: {}h, sources: {})",
            config.ingest.window_hours,
            sources.len()
        );
        println!("  fetched: {}", report.fetched);
        println!("  stale: {}", report.stale);
        println!("  duplicates: {}", report.duplicates);
        println!("  documents: {}", docs.len());
        print_failures(&report);
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let store = SqliteStore::connect(config).await?;
    let report = run_cycle(&sources, embedder.as_ref(), &store, &opts, now).await?;

    println!(
        "ingest (window: {}h, sources: {})",
        config.ingest.window_hours,
        sources.len()
    );
    println!("  fetched: {}", report.fetched);
    println!("  stale: {}", report.stale);
    println!("  duplicates: {}", report.duplicates);
    println!("  unchanged: {}", report.unchanged);
    println!("  inserted: {}", report.inserted);
    println!("  updated: {}", report.updated);
    print_failures(&report);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

fn print_failures(report: &CycleReport) {
    println!("  failed: {}", report.failed());
    for failure in &report.failures {
        println!(
            "    [{}] {}: {}",
            failure.stage, failure.item, failure.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sentinel_core::models::{NewsItem, RawItem};

    use crate::sources::{FetchedItem, ItemError};

    struct StaticSource(Vec<FetchedItem>);

    #[async_trait]
    impl Source for StaticSource {
        fn name(&self) -> &str {
            "static"
        }
        fn source_type(&self) -> &str {
            "test"
        }
        async fn fetch(&self, _window: &FetchWindow) -> Result<Vec<FetchedItem>> {
            Ok(self.0.clone())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn news(id: &str, content: &str, hours_ago: i64) -> FetchedItem {
        Ok(RawItem::News(NewsItem {
            id: Some(id.to_string()),
            ticker: Some("AAPL".to_string()),
            headline: Some(format!("headline {}", id)),
            content: Some(content.to_string()),
            url: None,
            published_at: Some(now() - chrono::Duration::hours(hours_ago)),
        }))
    }

    #[tokio::test]
    async fn test_preview_filters_dedups_and_reports() {
        let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource(vec![
            news("A1", "older copy", 3),
            news("A1", "newer copy", 1),
            news("OLD", "stale", 48),
            news("BAD", "  ", 1),
            Err(ItemError {
                kind: ItemErrorKind::Decode,
                label: "line 9".to_string(),
                message: "expected value".to_string(),
            }),
        ]))];

        let (report, docs) = preview_cycle(&sources, &CycleOptions::default(), now()).await;
        assert_eq!(report.fetched, 5);
        assert_eq!(report.stale, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.failures[0].stage, FailureStage::Normalize);
        assert_eq!(report.failures[1].stage, FailureStage::Decode);
        assert_eq!(report.failures[1].item, "static:line 9");

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "newer copy");
    }

    /// Takes `delay` to answer and reports `requests` requests.
    struct SlowSource {
        requests: usize,
        delay: Duration,
        items: Vec<FetchedItem>,
    }

    #[async_trait]
    impl Source for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }
        fn source_type(&self) -> &str {
            "test"
        }
        fn request_count(&self, _window: &FetchWindow) -> usize {
            self.requests
        }
        async fn fetch(&self, _window: &FetchWindow) -> Result<Vec<FetchedItem>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.items.clone())
        }
    }

    #[tokio::test]
    async fn test_fetch_deadline_scales_with_requests() {
        let opts = CycleOptions {
            fetch_timeout: Duration::from_millis(100),
            ..CycleOptions::default()
        };
        let items = vec![
            news("N1", "kept", 1),
            Err(ItemError {
                kind: ItemErrorKind::Fetch,
                label: "http://feed.test/AMD".to_string(),
                message: "HTTP status server error (500)".to_string(),
            }),
        ];

        let sources: Vec<Box<dyn Source>> = vec![Box::new(SlowSource {
            requests: 4,
            delay: Duration::from_millis(200),
            items: items.clone(),
        })];
        let (report, docs) = preview_cycle(&sources, &opts, now()).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].stage, FailureStage::Fetch);
        assert_eq!(report.failures[0].item, "slow:http://feed.test/AMD");

        let sources: Vec<Box<dyn Source>> = vec![Box::new(SlowSource {
            requests: 1,
            delay: Duration::from_millis(200),
            items,
        })];
        let (report, docs) = preview_cycle(&sources, &opts, now()).await;
        assert!(docs.is_empty());
        assert_eq!(report.failures[0].stage, FailureStage::Fetch);
        assert_eq!(report.failures[0].item, "slow");
    }
}
