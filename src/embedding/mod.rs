//! Embedding backends.
//!
//! Concrete implementations of [`sentinel_core::embedding::Embedder`]:
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings` on the OpenAI API.
//! - **[`OllamaEmbedder`]**: `POST /api/embed` on a local Ollama instance.
//! - **`LocalEmbedder`**: fastembed inference in-process; no network calls
//!   after the model download.
//!
//! Each backend makes exactly one attempt per call and classifies its
//! failures as transient or permanent. Timeouts and retries are applied
//! by the caller through [`crate::retry::call_with_retry`].
//!
//! # Failure classification
//!
//! - HTTP 429 and 5xx, connection errors, timeouts → transient
//! - Other HTTP 4xx, malformed responses → permanent

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use sentinel_core::embedding::{check_dims, prepare_input, Embedder};
use sentinel_core::error::EmbeddingError;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create the embedder named by `embedding.provider`.
///
/// | Config Value | Backend |
/// |-------------|----------|
/// | `"local"` | `LocalEmbedder` (requires the `local-embeddings-fastembed` feature) |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn request_error(e: reqwest::Error, secs: u64) -> EmbeddingError {
    if e.is_timeout() {
        return EmbeddingError::Timeout { secs };
    }
    EmbeddingError::Backend {
        transient: e.is_connect() || e.is_request() || e.is_body(),
        message: e.to_string(),
    }
}

async fn status_error(service: &str, response: reqwest::Response) -> EmbeddingError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    EmbeddingError::Backend {
        transient: status.as_u16() == 429 || status.is_server_error(),
        message: format!("{} API error {}: {}", service, status, body),
    }
}

fn malformed(service: &str, what: &str) -> EmbeddingError {
    EmbeddingError::Backend {
        message: format!("Invalid {} response: {}", service, what),
        transient: false,
    }
}

fn json_to_vec(service: &str, values: &[serde_json::Value]) -> Result<Vec<f32>, EmbeddingError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| malformed(service, "non-numeric embedding value"))
        })
        .collect()
}

// ============ OpenAI ============

/// Embedder backed by the OpenAI embeddings API.
///
/// Reads the key from `OPENAI_API_KEY` at construction.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_input_chars: usize,
    timeout_secs: u64,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_input_chars: config.max_input_chars,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = prepare_input(text, self.max_input_chars)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(status_error("OpenAI", response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;
        check_dims(parse_openai_response(&json)?, self.dims)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed("OpenAI", "missing data[0].embedding"))?;
    json_to_vec("OpenAI", embedding)
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance.
///
/// Requires Ollama running with the configured model pulled
/// (e.g. `ollama pull all-minilm`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_input_chars: usize,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: config.model.clone(),
            dims: config.dims,
            max_input_chars: config.max_input_chars,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = prepare_input(text, self.max_input_chars)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(status_error("Ollama", response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;
        check_dims(parse_ollama_response(&json)?, self.dims)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed("Ollama", "missing embeddings[0]"))?;
    json_to_vec("Ollama", embedding)
}

// ============ Local (fastembed) ============

/// In-process embedder using fastembed.
///
/// The model is downloaded from Hugging Face and loaded on first use, then
/// shared behind a mutex; inference runs on the blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    max_input_chars: usize,
    engine: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, native_dims) = fastembed_model(&config.model)?;
        if native_dims != config.dims {
            bail!(
                "embedding.dims is {} but local model '{}' produces {}-dimensional vectors",
                config.dims,
                config.model,
                native_dims
            );
        }
        Ok(Self {
            model_name: config.model.clone(),
            model,
            dims: native_dims,
            max_input_chars: config.max_input_chars,
            engine: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

/// Map a model name to its fastembed variant and native dimension.
#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel;
    match name {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = prepare_input(text, self.max_input_chars)?.into_owned();
        let engine = Arc::clone(&self.engine);
        let model = self.model.clone();

        let vector = tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock().map_err(|_| EmbeddingError::Backend {
                message: "local embedding model lock poisoned".to_string(),
                transient: false,
            })?;
            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| EmbeddingError::Backend {
                    message: format!("Failed to initialize local embedding model: {}", e),
                    transient: false,
                })?;
                *guard = Some(loaded);
            }
            let Some(text_embedding) = guard.as_mut() else {
                return Err(EmbeddingError::Backend {
                    message: "local embedding model unavailable".to_string(),
                    transient: false,
                });
            };
            text_embedding
                .embed(vec![input], None)
                .map_err(|e| EmbeddingError::Backend {
                    message: format!("Local embedding failed: {}", e),
                    transient: false,
                })?
                .into_iter()
                .next()
                .ok_or_else(|| malformed("local", "no embedding returned"))
        })
        .await
        .map_err(|e| EmbeddingError::Backend {
            message: format!("embedding task failed: {}", e),
            transient: false,
        })??;

        check_dims(vector, self.dims)
    }
}
