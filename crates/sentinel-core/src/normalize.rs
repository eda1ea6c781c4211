//! Raw item normalization.
//!
//! Turns heterogeneous [`RawItem`]s (price bars, news articles) into the
//! canonical [`Document`] shape with a deterministic `id`, so repeated
//! fetches of the same underlying event collapse to one stored record.
//!
//! # Identity
//!
//! | Item | `id` |
//! |------|------|
//! | news with feed id | the feed id, verbatim |
//! | news | `sha256("news" ‖ TICKER ‖ normalized headline ‖ published_at)` |
//! | price | `sha256("price" ‖ TICKER ‖ interval ‖ bar start)` |
//!
//! Headlines are normalized (trimmed, lowercased, whitespace collapsed)
//! before hashing so cosmetic differences between fetches do not create
//! new documents.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::NormalizationError;
use crate::models::{Document, NewsItem, PriceItem, RawItem};

const DERIVED_HEADLINE_CHARS: usize = 120;

/// Normalize one raw item into a [`Document`] with an empty embedding.
pub fn normalize(raw: &RawItem) -> Result<Document, NormalizationError> {
    match raw {
        RawItem::News(item) => normalize_news(item),
        RawItem::Price(item) => normalize_price(item),
    }
}

fn normalize_news(item: &NewsItem) -> Result<Document, NormalizationError> {
    let content = item
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(NormalizationError::MissingContent { kind: "news" })?;
    let published_at = item
        .published_at
        .ok_or(NormalizationError::MissingPublishedAt { kind: "news" })?;

    let ticker = normalize_ticker(item.ticker.as_deref());
    let headline = match item.headline.as_deref().map(str::trim) {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => derive_headline(content),
    };

    let id = match item.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => hash_id(&[
            "news",
            ticker.as_deref().unwrap_or(""),
            &normalize_headline(&headline),
            &rfc3339(published_at),
        ]),
    };

    Ok(Document {
        id,
        ticker,
        headline,
        content: content.to_string(),
        published_at,
        embedding: Vec::new(),
    })
}

fn normalize_price(item: &PriceItem) -> Result<Document, NormalizationError> {
    let ticker =
        normalize_ticker(item.ticker.as_deref()).ok_or(NormalizationError::MissingTicker)?;
    let close = item
        .close
        .ok_or(NormalizationError::MissingContent { kind: "price" })?;
    let start = item
        .start
        .ok_or(NormalizationError::MissingPublishedAt { kind: "price" })?;

    for (field, value) in [
        ("open", item.open),
        ("high", item.high),
        ("low", item.low),
        ("close", Some(close)),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(NormalizationError::InvalidValue {
                    field,
                    message: format!("expected a non-negative price, got {}", v),
                });
            }
        }
    }

    let interval = item
        .interval
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .unwrap_or("1d");

    let headline = match item.open {
        Some(open) if open > 0.0 => {
            let change = (close - open) / open * 100.0;
            format!("{} closed at ${:.2} ({:+.2}%)", ticker, close, change)
        }
        _ => format!("{} closed at ${:.2}", ticker, close),
    };

    let mut fields = Vec::new();
    if let Some(open) = item.open {
        fields.push(format!("open {:.2}", open));
    }
    if let Some(high) = item.high {
        fields.push(format!("high {:.2}", high));
    }
    if let Some(low) = item.low {
        fields.push(format!("low {:.2}", low));
    }
    fields.push(format!("close {:.2}", close));
    if let Some(volume) = item.volume {
        fields.push(format!("volume {}", volume));
    }
    let content = format!(
        "{} {} price bar starting {}: {}.",
        ticker,
        interval,
        start.format("%Y-%m-%d %H:%M UTC"),
        fields.join(", ")
    );

    let id = hash_id(&["price", &ticker, interval, &rfc3339(start)]);

    Ok(Document {
        id,
        ticker: Some(ticker),
        headline,
        content,
        published_at: start,
        embedding: Vec::new(),
    })
}

/// Trim and upper-case a ticker symbol; blank symbols become `None`.
pub fn normalize_ticker(ticker: Option<&str>) -> Option<String> {
    ticker
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
}

fn normalize_headline(headline: &str) -> String {
    headline
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First sentence of the body, capped at [`DERIVED_HEADLINE_CHARS`].
fn derive_headline(content: &str) -> String {
    let end = content
        .find(&['\n', '!', '?'][..])
        .into_iter()
        .chain(content.find(". "))
        .min()
        .unwrap_or(content.len());
    let sentence = content[..end].trim();
    if sentence.chars().count() <= DERIVED_HEADLINE_CHARS {
        sentence.to_string()
    } else {
        let cut: String = sentence.chars().take(DERIVED_HEADLINE_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn hash_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 20, 5, 0).unwrap()
    }

    fn news(headline: Option<&str>, content: Option<&str>) -> RawItem {
        RawItem::News(NewsItem {
            id: None,
            ticker: Some("aapl".to_string()),
            headline: headline.map(String::from),
            content: content.map(String::from),
            url: None,
            published_at: Some(t0()),
        })
    }

    #[test]
    fn test_news_id_is_deterministic() {
        let a = normalize(&news(Some("Apple beats earnings"), Some("Body one"))).unwrap();
        let b = normalize(&news(Some("  apple   BEATS earnings "), Some("Body two"))).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.ticker.as_deref(), Some("AAPL"));
        assert_eq!(a.headline, "Apple beats earnings");
    }

    #[test]
    fn test_news_id_changes_with_timestamp() {
        let a = normalize(&news(Some("Apple beats earnings"), Some("Body"))).unwrap();
        let mut later = match news(Some("Apple beats earnings"), Some("Body")) {
            RawItem::News(n) => n,
            _ => unreachable!(),
        };
        later.published_at = Some(t0() + chrono::Duration::hours(1));
        let b = normalize(&RawItem::News(later)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_feed_id_used_verbatim() {
        let item = RawItem::News(NewsItem {
            id: Some("A1".to_string()),
            ticker: Some("AAPL".to_string()),
            headline: Some("Apple beats earnings".to_string()),
            content: Some("Revenue rose.".to_string()),
            url: None,
            published_at: Some(t0()),
        });
        assert_eq!(normalize(&item).unwrap().id, "A1");
    }

    #[test]
    fn test_missing_content_rejected() {
        let err = normalize(&news(Some("Headline"), None)).unwrap_err();
        assert_eq!(err, NormalizationError::MissingContent { kind: "news" });

        let err = normalize(&news(Some("Headline"), Some("   "))).unwrap_err();
        assert_eq!(err, NormalizationError::MissingContent { kind: "news" });
    }

    #[test]
    fn test_missing_published_at_rejected() {
        let item = RawItem::News(NewsItem {
            content: Some("Body".to_string()),
            ..Default::default()
        });
        assert_eq!(
            normalize(&item).unwrap_err(),
            NormalizationError::MissingPublishedAt { kind: "news" }
        );
    }

    #[test]
    fn test_general_news_keeps_null_ticker() {
        let item = RawItem::News(NewsItem {
            ticker: None,
            headline: Some("Fed holds rates".to_string()),
            content: Some("The Fed left rates unchanged.".to_string()),
            published_at: Some(t0()),
            ..Default::default()
        });
        let doc = normalize(&item).unwrap();
        assert!(doc.ticker.is_none());
        assert!(doc.embedding.is_empty());
    }

    #[test]
    fn test_headline_derived_from_first_sentence() {
        let doc = normalize(&news(
            None,
            Some("Nvidia shares slid 4% on export curbs. Analysts were split."),
        ))
        .unwrap();
        assert_eq!(doc.headline, "Nvidia shares slid 4% on export curbs");
    }

    #[test]
    fn test_price_bar_normalized() {
        let item = RawItem::Price(PriceItem {
            ticker: Some("nvda".to_string()),
            open: Some(100.0),
            high: Some(112.0),
            low: Some(99.5),
            close: Some(110.0),
            volume: Some(1_000),
            start: Some(t0()),
            interval: None,
        });
        let doc = normalize(&item).unwrap();
        assert_eq!(doc.ticker.as_deref(), Some("NVDA"));
        assert_eq!(doc.headline, "NVDA closed at $110.00 (+10.00%)");
        assert!(doc.content.contains("close 110.00"));
        assert!(doc.content.contains("volume 1000"));
        assert_eq!(doc.published_at, t0());

        let again = normalize(&item).unwrap();
        assert_eq!(doc.id, again.id);
    }

    #[test]
    fn test_price_bar_requires_ticker_and_close() {
        let no_ticker = RawItem::Price(PriceItem {
            close: Some(1.0),
            start: Some(t0()),
            ..Default::default()
        });
        assert_eq!(
            normalize(&no_ticker).unwrap_err(),
            NormalizationError::MissingTicker
        );

        let no_close = RawItem::Price(PriceItem {
            ticker: Some("AMD".to_string()),
            start: Some(t0()),
            ..Default::default()
        });
        assert_eq!(
            normalize(&no_close).unwrap_err(),
            NormalizationError::MissingContent { kind: "price" }
        );
    }

    #[test]
    fn test_price_bar_rejects_negative_price() {
        let item = RawItem::Price(PriceItem {
            ticker: Some("AMD".to_string()),
            close: Some(-3.0),
            start: Some(t0()),
            ..Default::default()
        });
        assert!(matches!(
            normalize(&item).unwrap_err(),
            NormalizationError::InvalidValue { field: "close", .. }
        ));
    }

    #[test]
    fn test_price_and_news_ids_never_collide() {
        let price = RawItem::Price(PriceItem {
            ticker: Some("AAPL".to_string()),
            close: Some(1.0),
            start: Some(t0()),
            ..Default::default()
        });
        let a = normalize(&price).unwrap();
        let b = normalize(&news(Some("AAPL"), Some("x"))).unwrap();
        assert_ne!(a.id, b.id);
    }
}
