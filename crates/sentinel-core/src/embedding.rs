//! Embedder trait, input policy, and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! the shared over-length input policy ([`prepare_input`]), and pure
//! helpers for vector serialization and similarity.
//!
//! Concrete backends (OpenAI, Ollama, fastembed) live in the `sentinel`
//! app crate.
//!
//! # Input policy
//!
//! Empty or whitespace-only text is rejected with
//! [`EmbeddingError::EmptyInput`]. Text longer than the configured
//! character limit is **truncated with a warning**: it is cut at the last
//! char boundary inside the limit and a `tracing` warning records the
//! original length.

use std::borrow::Cow;

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// A text embedding backend with a fixed output dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed one text. The returned vector has exactly [`dims`](Embedder::dims)
    /// components; backends must check this with [`check_dims`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Apply the input policy: reject empty text, truncate over-length text.
pub fn prepare_input(text: &str, max_chars: usize) -> Result<Cow<'_, str>, EmbeddingError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }

    match trimmed.char_indices().nth(max_chars) {
        None => Ok(Cow::Borrowed(trimmed)),
        Some((cut, _)) => {
            tracing::warn!(
                original_chars = trimmed.chars().count(),
                max_chars,
                "embedding input truncated"
            );
            Ok(Cow::Owned(trimmed[..cut].to_string()))
        }
    }
}

/// Verify a backend's output length against the configured dimension.
pub fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use sentinel_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, which equals `1 - cosine_distance`.
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_prepare_input_rejects_empty() {
        assert_eq!(prepare_input("", 10), Err(EmbeddingError::EmptyInput));
        assert_eq!(prepare_input(" \n\t ", 10), Err(EmbeddingError::EmptyInput));
    }

    #[test]
    fn test_prepare_input_passes_short_text_through() {
        let out = prepare_input("  Apple beats earnings ", 100).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "Apple beats earnings");
    }

    #[test]
    fn test_prepare_input_truncates_on_char_boundary() {
        let out = prepare_input("ééééé", 3).unwrap();
        assert_eq!(out, "ééé");
        let exact = prepare_input("abc", 3).unwrap();
        assert_eq!(exact, "abc");
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(vec![0.0; 4], 4).is_ok());
        assert_eq!(
            check_dims(vec![0.0; 3], 4),
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        );
    }
}
