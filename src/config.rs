//! Configuration loading and validation.
//!
//! Sentinel is configured from a single TOML file, `./config/sentinel.toml`
//! by default. Every section except `[db]` has defaults, so a minimal
//! file only needs a database path:
//!
//! ```toml
//! [db]
//! path = "./data/sentinel.sqlite"
//! ```
//!
//! API keys are never read from the file; `[llm].api_key_env` and the
//! OpenAI embedding provider name environment variables instead.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Longer inputs are truncated before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_max_input_chars() -> usize {
    2000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default)]
    pub ticker_filter: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            max_context_chars: default_max_context_chars(),
            ticker_filter: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_match_threshold() -> f32 {
    0.3
}
fn default_match_count() -> usize {
    3
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            watchlist: default_watchlist(),
            window_hours: default_window_hours(),
            workers: default_workers(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_watchlist() -> Vec<String> {
    ["NVDA", "TSLA", "AAPL", "AMD", "MSFT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_window_hours() -> i64 {
    24
}
fn default_workers() -> usize {
    4
}
fn default_upsert_batch_size() -> usize {
    32
}

/// A configured feed, tagged by `type`.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// JSON array or JSON Lines file of raw items.
    File { name: String, path: PathBuf },
    /// HTTP GET endpoint returning the same JSON. A `{ticker}` placeholder
    /// in `url` is expanded once per watchlist symbol.
    Http { name: String, url: String },
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::File { name, .. } | SourceConfig::Http { name, .. } => name,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_llm_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "local" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.max_input_chars == 0 {
        bail!("embedding.max_input_chars must be >= 1");
    }

    let threshold = config.retrieval.match_threshold;
    if !(-1.0..=1.0).contains(&threshold) {
        bail!("retrieval.match_threshold must be in [-1.0, 1.0]");
    }
    if config.retrieval.match_count < 1 {
        bail!("retrieval.match_count must be >= 1");
    }
    if config.retrieval.max_context_chars < 1 {
        bail!("retrieval.max_context_chars must be >= 1");
    }

    if config.ingest.workers < 1 {
        bail!("ingest.workers must be >= 1");
    }
    if config.ingest.upsert_batch_size < 1 {
        bail!("ingest.upsert_batch_size must be >= 1");
    }
    if config.ingest.window_hours < 1 {
        bail!("ingest.window_hours must be >= 1");
    }

    let mut seen = std::collections::HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.name()) {
            bail!("Duplicate source name: '{}'", source.name());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"./data/s.sqlite\"\n").unwrap();
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.embedding.dims, 384);
        assert_eq!(cfg.retrieval.match_threshold, 0.3);
        assert_eq!(cfg.retrieval.match_count, 3);
        assert_eq!(cfg.ingest.watchlist.len(), 5);
        assert!(cfg.sources.is_empty());
        assert!(cfg.llm.is_none());
    }

    #[test]
    fn test_sources_and_llm_parse() {
        let cfg = parse_config(
            r#"
            [db]
            path = "x.sqlite"

            [[sources]]
            name = "news"
            type = "file"
            path = "./feeds/news.jsonl"

            [[sources]]
            name = "quotes"
            type = "http"
            url = "https://example.test/quotes/{ticker}"

            [llm]
            model = "llama-3.3-70b-versatile"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert!(matches!(cfg.sources[1], SourceConfig::Http { .. }));
        let llm = cfg.llm.unwrap();
        assert_eq!(llm.api_key_env, "GROQ_API_KEY");
        assert_eq!(llm.temperature, 0.5);
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = "[db]\npath = \"x\"\n";
        assert!(parse_config(&format!("{}[retrieval]\nmatch_threshold = 1.5\n", base)).is_err());
        assert!(parse_config(&format!("{}[retrieval]\nmatch_count = 0\n", base)).is_err());
        assert!(parse_config(&format!("{}[embedding]\ndims = 0\n", base)).is_err());
        assert!(parse_config(&format!("{}[embedding]\nprovider = \"magic\"\n", base)).is_err());
        assert!(parse_config(&format!("{}[ingest]\nworkers = 0\n", base)).is_err());
    }

    #[test]
    fn test_rejects_duplicate_source_names() {
        let err = parse_config(
            r#"
            [db]
            path = "x"
            [[sources]]
            name = "a"
            type = "file"
            path = "a.json"
            [[sources]]
            name = "a"
            type = "file"
            path = "b.json"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate source name"));
    }
}
