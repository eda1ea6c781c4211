//! Error taxonomy for the retrieval pipeline.
//!
//! Each stage has its own error type so callers can apply the right
//! propagation policy: normalization and embedding failures skip one item,
//! write failures abort one upsert chunk, and query failures surface to
//! the caller instead of masquerading as an empty result.

use thiserror::Error;

/// A raw item could not be turned into a [`Document`](crate::models::Document).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("{kind} item has no content")]
    MissingContent { kind: &'static str },

    #[error("{kind} item has no publication timestamp")]
    MissingPublishedAt { kind: &'static str },

    #[error("price item has no ticker")]
    MissingTicker,

    #[error("invalid {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Text could not be embedded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding backend error: {message}")]
    Backend { message: String, transient: bool },

    #[error("embedding request timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A batch could not be written to the vector store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreWriteError {
    #[error("document {id} has a {actual}-dimensional embedding, store expects {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("store write failed: {message}")]
    Backend { message: String, transient: bool },

    #[error("store write timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A read against the vector store failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreQueryError {
    #[error("query embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid search parameters: {0}")]
    InvalidParameters(String),

    #[error("store query failed: {message}")]
    Backend { message: String, transient: bool },

    #[error("store query timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Errors from external calls that may succeed when retried.
///
/// Implemented by every error type that crosses an I/O boundary so a
/// single retry helper can wrap embedding, write, and query calls.
pub trait Transient {
    /// Whether a retry has a reasonable chance of succeeding.
    fn is_transient(&self) -> bool;
    /// The error to report when an attempt exceeds its deadline.
    fn timed_out(secs: u64) -> Self;
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Backend {
                transient: true,
                ..
            } | EmbeddingError::Timeout { .. }
        )
    }

    fn timed_out(secs: u64) -> Self {
        EmbeddingError::Timeout { secs }
    }
}

impl Transient for StoreWriteError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreWriteError::Backend {
                transient: true,
                ..
            } | StoreWriteError::Timeout { .. }
        )
    }

    fn timed_out(secs: u64) -> Self {
        StoreWriteError::Timeout { secs }
    }
}

impl Transient for StoreQueryError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreQueryError::Backend {
                transient: true,
                ..
            } | StoreQueryError::Timeout { .. }
        )
    }

    fn timed_out(secs: u64) -> Self {
        StoreQueryError::Timeout { secs }
    }
}
