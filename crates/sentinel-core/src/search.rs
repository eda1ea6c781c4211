//! Similarity ranking shared by every [`VectorStore`](crate::store::VectorStore) backend.
//!
//! Backends compute a similarity per stored document and hand the scored
//! candidates to [`rank`], so threshold semantics and ordering are
//! identical whether the rows came from SQLite or memory.
//!
//! # Ranking
//!
//! 1. Drop candidates whose similarity is not strictly greater than the
//!    threshold (NaN never passes).
//! 2. Sort by similarity (desc), compared after rounding to the nearest
//!    multiple of [`SCORE_EPSILON`]. Scores that round to the same value
//!    are ties. Two scores less than `SCORE_EPSILON` apart can still land
//!    in adjacent buckets when they straddle a rounding boundary; they are
//!    then ordered by score.
//! 3. Break ties by `published_at` (desc), then `document_id` (asc).
//! 4. Truncate to `match_count`.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{Document, QueryResult};

/// Bucket width for similarity comparison.
pub const SCORE_EPSILON: f32 = 1e-6;

/// Score a stored document against a query embedding.
pub fn score(query: &[f32], doc: &Document) -> QueryResult {
    QueryResult::from_document(doc, cosine_similarity(query, &doc.embedding))
}

/// Apply threshold, ordering, and cap to scored candidates.
pub fn rank(
    candidates: impl IntoIterator<Item = QueryResult>,
    match_threshold: f32,
    match_count: usize,
) -> Vec<QueryResult> {
    let mut results: Vec<QueryResult> = candidates
        .into_iter()
        .filter(|c| c.similarity > match_threshold)
        .collect();

    results.sort_by(compare);
    results.truncate(match_count);
    results
}

/// Total order over results: similarity bucket, recency, then id.
fn compare(a: &QueryResult, b: &QueryResult) -> Ordering {
    score_bucket(b.similarity)
        .cmp(&score_bucket(a.similarity))
        .then(b.published_at.cmp(&a.published_at))
        .then(a.document_id.cmp(&b.document_id))
}

/// Round a similarity to its bucket. Bucketing, unlike an epsilon
/// comparison, keeps the comparator a total order.
fn score_bucket(similarity: f32) -> i64 {
    (f64::from(similarity) / f64::from(SCORE_EPSILON)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, hour, 0, 0).unwrap()
    }

    fn result(id: &str, similarity: f32, hour: u32) -> QueryResult {
        QueryResult {
            document_id: id.to_string(),
            ticker: None,
            headline: format!("headline {}", id),
            content: String::new(),
            published_at: at(hour),
            similarity,
        }
    }

    fn ids(results: &[QueryResult]) -> Vec<&str> {
        results.iter().map(|r| r.document_id.as_str()).collect()
    }

    #[test]
    fn test_sorted_by_similarity_desc() {
        let ranked = rank(
            vec![
                result("a", 0.5, 1),
                result("b", 0.9, 1),
                result("c", 0.7, 1),
            ],
            0.0,
            10,
        );
        assert_eq!(ids(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let ranked = rank(
            vec![
                result("at", 0.75, 1),
                result("below", 0.74, 1),
                result("above", 0.76, 1),
            ],
            0.75,
            10,
        );
        assert_eq!(ids(&ranked), vec!["above"]);
        assert!(ranked.iter().all(|r| r.similarity > 0.75));
    }

    #[test]
    fn test_nan_never_passes() {
        let ranked = rank(vec![result("nan", f32::NAN, 1)], -1.0, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_ties_broken_by_recency() {
        let ranked = rank(
            vec![
                result("old", 0.8, 1),
                result("new", 0.8 + 1e-7, 5),
                result("mid", 0.8, 3),
            ],
            0.0,
            10,
        );
        assert_eq!(ids(&ranked), vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_adjacent_buckets_ordered_by_score() {
        let ranked = rank(
            vec![result("newer", 0.800_000_3, 5), result("older", 0.800_000_7, 1)],
            0.0,
            10,
        );
        assert_eq!(ids(&ranked), vec!["older", "newer"]);
    }

    #[test]
    fn test_full_tie_broken_by_id() {
        let ranked = rank(vec![result("b", 0.8, 1), result("a", 0.8, 1)], 0.0, 10);
        assert_eq!(ids(&ranked), vec!["a", "b"]);
    }

    #[test]
    fn test_truncated_to_match_count() {
        let ranked = rank(
            (0..10).map(|i| result(&format!("d{}", i), 0.1 * i as f32, 1)),
            -1.0,
            3,
        );
        assert_eq!(ranked.len(), 3);
        assert_eq!(ids(&ranked), vec!["d9", "d8", "d7"]);
    }

    #[test]
    fn test_empty_is_valid() {
        assert!(rank(Vec::new(), 0.3, 3).is_empty());
        assert!(rank(vec![result("a", 0.1, 1)], 0.3, 3).is_empty());
    }

    #[test]
    fn test_score_uses_cosine() {
        let doc = Document {
            id: "d".to_string(),
            ticker: None,
            headline: String::new(),
            content: String::new(),
            published_at: at(1),
            embedding: vec![1.0, 0.0],
        };
        let r = score(&[1.0, 0.0], &doc);
        assert!((r.similarity - 1.0).abs() < 1e-6);
        assert_eq!(r.document_id, "d");
    }
}
