//! Source feeds.
//!
//! A [`Source`] yields raw items for one ingestion cycle. Two built-in
//! kinds are configured through `[[sources]]`:
//!
//! | `type` | Reads |
//! |--------|-------|
//! | `file` | a JSON array or JSON Lines file of [`RawItem`]s |
//! | `http` | a GET endpoint returning the same JSON; `{ticker}` in the URL is expanded per watchlist symbol |
//!
//! Records are decoded one at a time so a single malformed record becomes
//! an [`ItemError`] instead of failing the whole feed. Templated HTTP
//! sources likewise report a failed symbol as an [`ItemError`] and keep
//! the items fetched for the others.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use sentinel_core::models::RawItem;

use crate::config::{Config, SourceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemErrorKind {
    /// One request of a multi-request source failed.
    Fetch,
    /// The record was not a valid [`RawItem`].
    Decode,
}

/// A record, or a request, that produced no [`RawItem`].
#[derive(Debug, Clone, PartialEq)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    /// Position in the feed (`line 3`, `item 0`) or the failed URL.
    pub label: String,
    pub message: String,
}

/// One decoded record, or why there is none.
pub type FetchedItem = Result<RawItem, ItemError>;

/// The slice of time and symbols a cycle asks for.
#[derive(Debug, Clone)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub watchlist: Vec<String>,
}

/// A feed of raw items.
#[async_trait]
pub trait Source: Send + Sync {
    /// Configured instance name.
    fn name(&self) -> &str;

    /// `"file"`, `"http"`, or a custom type.
    fn source_type(&self) -> &str;

    /// Requests one fetch makes for `window`; the orchestrator scales its
    /// fetch deadline by this.
    fn request_count(&self, _window: &FetchWindow) -> usize {
        1
    }

    /// Fetch candidate items for `window`. Sources may return items
    /// outside the window; the orchestrator filters them.
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<FetchedItem>>;
}

/// Reads items from a local JSON or JSON Lines file.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "file"
    }

    async fn fetch(&self, _window: &FetchWindow) -> Result<Vec<FetchedItem>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed file: {}", self.path.display()))?;
        parse_items(&text, None)
    }
}

/// Fetches items from an HTTP endpoint.
pub struct HttpSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn get_items(&self, url: &str, ticker: Option<&str>) -> Result<Vec<FetchedItem>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} failed", url))?;
        let text = response.text().await?;
        parse_items(&text, ticker)
    }

    /// Concrete URLs for a fetch, one per symbol when templated.
    fn urls<'a>(&self, watchlist: &'a [String]) -> Vec<(String, Option<&'a str>)> {
        if self.url.contains("{ticker}") {
            watchlist
                .iter()
                .map(|t| (self.url.replace("{ticker}", t), Some(t.as_str())))
                .collect()
        } else {
            vec![(self.url.clone(), None)]
        }
    }
}

#[async_trait]
impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "http"
    }

    fn request_count(&self, window: &FetchWindow) -> usize {
        self.urls(&window.watchlist).len()
    }

    /// A single-URL source fails as a whole. With a `{ticker}` template,
    /// each failed symbol becomes one [`ItemErrorKind::Fetch`] item and the
    /// remaining symbols are still fetched.
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<FetchedItem>> {
        let urls = self.urls(&window.watchlist);
        if urls.len() == 1 && urls[0].1.is_none() {
            let (url, _) = &urls[0];
            return self.get_items(url, None).await;
        }

        let mut items = Vec::new();
        for (url, ticker) in &urls {
            match self.get_items(url, *ticker).await {
                Ok(fetched) => items.extend(fetched),
                Err(e) => {
                    tracing::warn!(source = %self.name, url = %url, error = %e, "request failed");
                    items.push(Err(ItemError {
                        kind: ItemErrorKind::Fetch,
                        label: url.clone(),
                        message: format!("{:#}", e),
                    }));
                }
            }
        }
        Ok(items)
    }
}

/// Build the configured sources.
pub fn build_sources(config: &Config) -> Result<Vec<Box<dyn Source>>> {
    let timeout = Duration::from_secs(config.ingest.timeout_secs);
    config
        .sources
        .iter()
        .map(|s| -> Result<Box<dyn Source>> {
            match s {
                SourceConfig::File { name, path } => Ok(Box::new(FileSource::new(name, path))),
                SourceConfig::Http { name, url } => {
                    Ok(Box::new(HttpSource::new(name, url, timeout)?))
                }
            }
        })
        .collect()
}

/// Decode a feed body: a JSON array, or one JSON object per line.
///
/// `default_ticker` fills in records that carry no `ticker` of their own
/// (per-symbol HTTP endpoints often omit it).
///
/// Only an unparseable array fails the whole body; in JSON Lines each
/// bad line is reported on its own.
pub fn parse_items(text: &str, default_ticker: Option<&str>) -> Result<Vec<FetchedItem>> {
    let trimmed = text.trim_start();

    let records: Vec<(String, Result<Value, String>)> = if trimmed.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(trimmed).context("Feed body is not a valid JSON array")?;
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("item {}", i), Ok(v)))
            .collect()
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                (
                    format!("line {}", i + 1),
                    serde_json::from_str::<Value>(line).map_err(|e| e.to_string()),
                )
            })
            .collect()
    };

    Ok(records
        .into_iter()
        .map(|(label, value)| {
            let decoded = value.and_then(|mut v| {
                if let (Some(ticker), Some(obj)) = (default_ticker, v.as_object_mut()) {
                    let missing = obj.get("ticker").map_or(true, Value::is_null);
                    if missing {
                        obj.insert("ticker".to_string(), Value::String(ticker.to_string()));
                    }
                }
                serde_json::from_value::<RawItem>(v).map_err(|e| e.to_string())
            });
            decoded.map_err(|message| ItemError {
                kind: ItemErrorKind::Decode,
                label,
                message,
            })
        })
        .collect())
}

/// Print configured sources and whether they look reachable.
pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<16} {:<8} {:<10} TARGET", "SOURCE", "TYPE", "STATUS");
    for source in &config.sources {
        match source {
            SourceConfig::File { name, path } => {
                let status = if path.exists() { "OK" } else { "MISSING" };
                println!("{:<16} {:<8} {:<10} {}", name, "file", status, path.display());
            }
            SourceConfig::Http { name, url } => {
                println!("{:<16} {:<8} {:<10} {}", name, "http", "REMOTE", url);
            }
        }
    }
    if config.sources.is_empty() {
        println!("(no sources configured)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn window() -> FetchWindow {
        FetchWindow {
            start: Utc::now() - chrono::Duration::hours(24),
            end: Utc::now(),
            watchlist: vec!["NVDA".to_string(), "AMD".to_string()],
        }
    }

    #[test]
    fn test_parse_json_array() {
        let items = parse_items(
            r#"[{"kind":"news","ticker":"AAPL","headline":"h","content":"c","published_at":"2026-10-16T20:00:00Z"},
                {"kind":"price","ticker":"NVDA","close":1.0,"start":"2026-10-16T00:00:00Z"}]"#,
            None,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[test]
    fn test_jsonl_malformed_line_isolated() {
        let body = "{\"kind\":\"news\",\"content\":\"a\",\"published_at\":\"2026-10-16T20:00:00Z\"}\n\
                    not json\n\
                    \n\
                    {\"kind\":\"weather\"}\n";
        let items = parse_items(body, None).unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap_err().label, "line 2");
        assert_eq!(items[2].as_ref().unwrap_err().label, "line 4");
    }

    #[test]
    fn test_invalid_array_fails_whole_feed() {
        assert!(parse_items("[{\"kind\":", None).is_err());
    }

    #[test]
    fn test_default_ticker_fills_missing() {
        let items = parse_items(
            r#"[{"kind":"price","close":2.0,"start":"2026-10-16T00:00:00Z"},
                {"kind":"price","ticker":"AMD","close":3.0,"start":"2026-10-16T00:00:00Z"}]"#,
            Some("NVDA"),
        )
        .unwrap();
        match (&items[0], &items[1]) {
            (Ok(RawItem::Price(a)), Ok(RawItem::Price(b))) => {
                assert_eq!(a.ticker.as_deref(), Some("NVDA"));
                assert_eq!(b.ticker.as_deref(), Some("AMD"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_http_urls_expand_ticker() {
        let src = HttpSource::new("q", "https://feed.test/{ticker}/news", Duration::from_secs(1))
            .unwrap();
        let w = window();
        let urls = src.urls(&w.watchlist);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].0, "https://feed.test/NVDA/news");
        assert_eq!(urls[1].1, Some("AMD"));

        let plain = HttpSource::new("q", "https://feed.test/all", Duration::from_secs(1)).unwrap();
        assert_eq!(plain.urls(&w.watchlist).len(), 1);
    }

    /// Serves `/NVDA` with one news item and answers 500 for anything else.
    async fn spawn_feed_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let response = if request.starts_with("GET /NVDA ") {
                    let body = format!(
                        "[{{\"kind\":\"news\",\"headline\":\"Nvidia rallies\",\"content\":\"up\",\"published_at\":\"{}\"}}]",
                        Utc::now().to_rfc3339()
                    );
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                } else {
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_failed_symbol_keeps_other_symbols() {
        let base = spawn_feed_server().await;
        let src = HttpSource::new("quotes", format!("{}/{{ticker}}", base), Duration::from_secs(5))
            .unwrap();
        let w = window();
        assert_eq!(src.request_count(&w), 2);

        let items = src.fetch(&w).await.unwrap();
        assert_eq!(items.len(), 2);
        match &items[0] {
            Ok(RawItem::News(n)) => assert_eq!(n.ticker.as_deref(), Some("NVDA")),
            other => panic!("expected NVDA news, got {:?}", other),
        }
        let failed = items[1].as_ref().unwrap_err();
        assert_eq!(failed.kind, ItemErrorKind::Fetch);
        assert!(failed.label.ends_with("/AMD"));
        assert!(failed.message.contains("500"));
    }

    #[tokio::test]
    async fn test_http_single_url_failure_fails_source() {
        let base = spawn_feed_server().await;
        let src = HttpSource::new("all", format!("{}/all", base), Duration::from_secs(5)).unwrap();
        assert!(src.fetch(&window()).await.is_err());
    }

    #[tokio::test]
    async fn test_file_source_reads_jsonl() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("news.jsonl");
        std::fs::write(
            &path,
            "{\"kind\":\"news\",\"ticker\":\"TSLA\",\"content\":\"x\",\"published_at\":\"2026-10-16T20:00:00Z\"}\n",
        )
        .unwrap();

        let src = FileSource::new("news", &path);
        let items = src.fetch(&window()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(src.source_type(), "file");

        let missing = FileSource::new("gone", tmp.path().join("nope.json"));
        assert!(missing.fetch(&window()).await.is_err());
    }
}
