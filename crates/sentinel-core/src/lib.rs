//! # Sentinel Core
//!
//! Runtime-agnostic logic for Sentinel: data models, raw item
//! normalization, the embedder and vector store traits, similarity
//! ranking, and prompt assembly.
//!
//! This crate contains no tokio, sqlx, or network dependencies. Concrete
//! embedding backends, the SQLite store, the ingestion orchestrator and
//! the query engine live in the `sentinel` app crate.

pub mod embedding;
pub mod error;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod search;
pub mod store;
