//! # Sentinel
//!
//! Financial news ingestion and retrieval-augmented question answering.
//!
//! Sentinel pulls price bars and news from configured feeds, normalizes
//! them into canonical documents, embeds them, and keeps them in a local
//! SQLite vector store. Questions are embedded the same way, matched
//! against the store by cosine similarity, and the best matches are
//! assembled into a grounded prompt for a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │   Sources   │──▶│  Normalize + Embed   │──▶│  SQLite  │
//! │ file / http │   │  (ingestion cycle)   │   │ vectors  │
//! └─────────────┘   └──────────────────────┘   └────┬─────┘
//!                                                   │
//!                    question ──▶ embed ──▶ search ─┤
//!                                                   ▼
//!                                         ┌────────────────┐
//!                                         │ prompt ──▶ LLM │
//!                                         └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sentinel init                       # create database, record dimension
//! sentinel ingest                     # run one ingestion cycle
//! sentinel ask "Why did NVDA drop today?" --ticker NVDA
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`embedding`] | Embedding backends |
//! | [`sources`] | Source feeds |
//! | [`ingest`] | Ingestion cycle |
//! | [`query`] | Retrieval-augmented query engine |
//! | [`llm`] | Language-model client |
//! | [`retry`] | Timeouts and retries for external calls |

pub mod config;
pub mod db;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod query;
pub mod retry;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
