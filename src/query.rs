//! Retrieval-augmented query engine.
//!
//! Turns a question into ranked context and an assembled prompt:
//!
//! ```text
//! question ──▶ embed ──▶ store.search ──▶ assemble_prompt ──▶ Answer
//!                                                   │
//!                                   (optional) LanguageModel::complete
//! ```
//!
//! An empty result set is a normal outcome and yields a prompt with
//! [`ContextStatus::NoRelevantContext`]; a failing store is an error and is
//! never reported as empty context.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use sentinel_core::embedding::Embedder;
use sentinel_core::error::{EmbeddingError, StoreQueryError};
use sentinel_core::models::QueryResult;
use sentinel_core::normalize::normalize_ticker;
use sentinel_core::prompt::{assemble_prompt, ContextStatus, Prompt, ANALYST_INSTRUCTIONS};
use sentinel_core::store::{SearchRequest, VectorStore};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::{ChatClient, LanguageModel, ModelError};
use crate::retry::call_with_retry;
use crate::sqlite_store::SqliteStore;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreQueryError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Retrieval parameters, from `[retrieval]` plus per-call overrides.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub match_threshold: f32,
    pub match_count: usize,
    pub max_context_chars: usize,
    /// Default symbol restriction when a call names none.
    pub ticker_filter: Option<String>,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
    pub model_timeout: Duration,
    pub max_retries: u32,
}

impl QuerySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            match_threshold: config.retrieval.match_threshold,
            match_count: config.retrieval.match_count,
            max_context_chars: config.retrieval.max_context_chars,
            ticker_filter: normalize_ticker(config.retrieval.ticker_filter.as_deref()),
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            store_timeout: Duration::from_secs(config.retrieval.timeout_secs),
            model_timeout: Duration::from_secs(
                config.llm.as_ref().map(|l| l.timeout_secs).unwrap_or(60),
            ),
            max_retries: config.embedding.max_retries,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            match_threshold: 0.3,
            match_count: 3,
            max_context_chars: 6000,
            ticker_filter: None,
            embed_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(30),
            model_timeout: Duration::from_secs(60),
            max_retries: 1,
        }
    }
}

/// Retrieved context and the prompt built from it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub ticker: Option<String>,
    pub context: Vec<QueryResult>,
    pub prompt: Prompt,
}

impl Answer {
    pub fn has_context(&self) -> bool {
        self.prompt.status == ContextStatus::Grounded
    }
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            embedder,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Ranked documents for `query`. `ticker` overrides the configured filter.
    pub async fn retrieve(
        &self,
        query: &str,
        ticker: Option<&str>,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let ticker = self.resolve_ticker(ticker);
        let s = &self.settings;

        let embedding = call_with_retry("embed query", s.embed_timeout, s.max_retries, || {
            self.embedder.embed(query)
        })
        .await?;

        let request = SearchRequest {
            query_embedding: &embedding,
            match_threshold: s.match_threshold,
            match_count: s.match_count,
            ticker: ticker.as_deref(),
        };
        let results = call_with_retry("search", s.store_timeout, s.max_retries, || {
            self.store.search(&request)
        })
        .await?;

        tracing::debug!(
            results = results.len(),
            ticker = ticker.as_deref().unwrap_or("-"),
            "retrieved context"
        );
        Ok(results)
    }

    /// Retrieve context for `question` and assemble the prompt.
    pub async fn answer(&self, question: &str, ticker: Option<&str>) -> Result<Answer, QueryError> {
        let context = self.retrieve(question, ticker).await?;
        let prompt = assemble_prompt(question, &context, self.settings.max_context_chars);
        if prompt.status == ContextStatus::NoRelevantContext {
            tracing::info!("no stored document cleared the similarity threshold");
        }
        Ok(Answer {
            question: question.trim().to_string(),
            ticker: self.resolve_ticker(ticker),
            context,
            prompt,
        })
    }

    /// Ask `model` to answer from the assembled prompt.
    pub async fn generate(
        &self,
        model: &dyn LanguageModel,
        answer: &Answer,
    ) -> Result<String, QueryError> {
        let s = &self.settings;
        let text = call_with_retry("complete", s.model_timeout, s.max_retries, || {
            model.complete(ANALYST_INSTRUCTIONS, &answer.prompt.text)
        })
        .await?;
        Ok(text)
    }

    fn resolve_ticker(&self, explicit: Option<&str>) -> Option<String> {
        normalize_ticker(explicit).or_else(|| self.settings.ticker_filter.clone())
    }
}

/// Build an engine over the configured store and embedder, applying
/// command-line overrides.
pub async fn engine_from_config(
    config: &Config,
    threshold: Option<f32>,
    count: Option<usize>,
) -> Result<QueryEngine> {
    let mut settings = QuerySettings::from_config(config);
    if let Some(t) = threshold {
        if !(-1.0..=1.0).contains(&t) {
            anyhow::bail!("--threshold must be in [-1.0, 1.0]");
        }
        settings.match_threshold = t;
    }
    if let Some(c) = count {
        if c == 0 {
            anyhow::bail!("--count must be >= 1");
        }
        settings.match_count = c;
    }

    let store = SqliteStore::connect(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(QueryEngine::new(embedder, Arc::new(store), settings))
}

/// Print ranked results, one per line.
pub fn print_results(results: &[QueryResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {:<5} {}  {}",
            i + 1,
            r.similarity,
            r.ticker.as_deref().unwrap_or("-"),
            r.published_at.format("%Y-%m-%d %H:%M"),
            r.headline
        );
        println!("    id: {}", r.document_id);
    }
}

/// `sentinel ask`: retrieve context, then answer with the configured model
/// or print the prompt.
pub async fn run_ask(
    config: &Config,
    question: &str,
    ticker: Option<&str>,
    threshold: Option<f32>,
    count: Option<usize>,
    prompt_only: bool,
) -> Result<()> {
    let engine = engine_from_config(config, threshold, count).await?;
    let answer = engine.answer(question, ticker).await?;

    println!("Sources:");
    if answer.has_context() {
        for (i, r) in answer.context.iter().take(answer.prompt.included).enumerate() {
            println!(
                "  {}. {} ({}, {:.3})",
                i + 1,
                r.headline,
                r.ticker.as_deref().unwrap_or("market"),
                r.similarity
            );
        }
        if answer.prompt.dropped > 0 {
            println!("  ({} more left out of the prompt)", answer.prompt.dropped);
        }
    } else {
        println!("  No specific news found.");
    }
    println!();

    match (&config.llm, prompt_only) {
        (Some(llm), false) => {
            let model = ChatClient::new(llm)?;
            let text = engine.generate(&model, &answer).await?;
            println!("{}", text);
        }
        _ => {
            println!("--- system ---");
            println!("{}", ANALYST_INSTRUCTIONS);
            println!("--- prompt ---");
            print!("{}", answer.prompt.text);
        }
    }
    Ok(())
}

/// `sentinel search`: print ranked results for a query.
pub async fn run_search(
    config: &Config,
    query: &str,
    ticker: Option<&str>,
    threshold: Option<f32>,
    count: Option<usize>,
) -> Result<()> {
    let engine = engine_from_config(config, threshold, count).await?;
    let results = engine.retrieve(query, ticker).await?;
    print_results(&results);
    Ok(())
}
