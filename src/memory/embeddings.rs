use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{
    Config, EmbeddingProviderKind, DEFAULT_EMBEDDING_MODEL, DEFAULT_GEMINI_EMBEDDING_MODEL,
    DEFAULT_MISTRAL_EMBEDDING_MODEL, DEFAULT_VOYAGE_EMBEDDING_MODEL,
};

use super::error::MemoryError;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A provider that turns text into dense vector embeddings.
///
/// Injected into the memory engine at construction. `embed_batch` must either
/// return exactly one vector per input, in input order, or fail as a whole.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable provider identifier (e.g. `openai`).
    fn id(&self) -> &str;

    /// The model identifier (e.g. `text-embedding-3-small`).
    fn model(&self) -> &str;

    /// Dimensionality of the vectors produced.
    fn dimensions(&self) -> usize;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f64>>;

    /// Embed a batch of chunk texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create the embedding provider named by the `memory` config section.
///
/// Fails with a configuration error when the API key is missing.
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, MemoryError> {
    let memory = &config.memory;
    let kind = memory.provider.unwrap_or_default();
    let api_key = memory.api_key().ok_or_else(|| {
        MemoryError::configuration(
            "memory.remote.apiKey",
            format!("no API key configured for embedding provider '{kind}'"),
        )
    })?;

    let remote = memory.remote.clone().unwrap_or_default();
    let headers = remote.headers.unwrap_or_default();

    let provider: Arc<dyn EmbeddingProvider> = match kind {
        EmbeddingProviderKind::Openai => Arc::new(
            OpenAiEmbeddingProvider::new(api_key, memory.model.clone())
                .with_base_url(remote.base_url)
                .with_headers(headers)
                .with_dimensions(memory.dimensions),
        ),
        EmbeddingProviderKind::Mistral => Arc::new(
            OpenAiEmbeddingProvider::mistral(api_key, memory.model.clone())
                .with_base_url(remote.base_url)
                .with_headers(headers)
                .with_dimensions(memory.dimensions),
        ),
        EmbeddingProviderKind::Voyage => Arc::new(
            OpenAiEmbeddingProvider::voyage(api_key, memory.model.clone())
                .with_base_url(remote.base_url)
                .with_headers(headers)
                .with_dimensions(memory.dimensions),
        ),
        EmbeddingProviderKind::Gemini => Arc::new(
            GeminiEmbeddingProvider::new(api_key, memory.model.clone())
                .with_base_url(remote.base_url)
                .with_dimensions(memory.dimensions),
        ),
    };

    Ok(provider)
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";

/// Calls an OpenAI-compatible `/embeddings` endpoint.
///
/// OpenAI, Mistral and Voyage share this wire format and differ only in base
/// URL, default model and dimensions.
pub struct OpenAiEmbeddingProvider {
    id: &'static str,
    api_key: String,
    model: String,
    base_url: String,
    headers: HashMap<String, String>,
    dimensions: usize,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self::with_defaults("openai", api_key, model, DEFAULT_EMBEDDING_MODEL, OPENAI_BASE_URL, 1536)
    }

    pub fn mistral(api_key: String, model: Option<String>) -> Self {
        Self::with_defaults(
            "mistral",
            api_key,
            model,
            DEFAULT_MISTRAL_EMBEDDING_MODEL,
            MISTRAL_BASE_URL,
            1024,
        )
    }

    pub fn voyage(api_key: String, model: Option<String>) -> Self {
        Self::with_defaults(
            "voyage",
            api_key,
            model,
            DEFAULT_VOYAGE_EMBEDDING_MODEL,
            VOYAGE_BASE_URL,
            1024,
        )
    }

    fn with_defaults(
        id: &'static str,
        api_key: String,
        model: Option<String>,
        default_model: &str,
        base_url: &str,
        dimensions: usize,
    ) -> Self {
        Self {
            id,
            api_key,
            model: model.unwrap_or_else(|| default_model.to_string()),
            base_url: base_url.to_string(),
            headers: HashMap::new(),
            dimensions,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        if let Some(d) = dimensions {
            self.dimensions = d;
        }
        self
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f64>,
    #[serde(default)]
    index: Option<usize>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) => Ok(v),
            None => bail!("{} returned no embedding for query", self.id),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = OpenAiEmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let resp = request
            .send()
            .await?
            .error_for_status()?
            .json::<OpenAiEmbeddingResponse>()
            .await?;

        if resp.data.len() != texts.len() {
            bail!(
                "{} returned {} embeddings for {} inputs",
                self.id,
                resp.data.len(),
                texts.len()
            );
        }

        let mut data = resp.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Calls the Google Generative AI embedding endpoints.
pub struct GeminiEmbeddingProvider {
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl GeminiEmbeddingProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_GEMINI_EMBEDDING_MODEL.to_string()),
            base_url: GEMINI_BASE_URL.to_string(),
            dimensions: 768,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        if let Some(d) = dimensions {
            self.dimensions = d;
        }
        self
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn request(&self, text: &str) -> GeminiEmbeddingRequest {
        GeminiEmbeddingRequest {
            model: self.model_path(),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        }
    }
}

#[derive(Serialize)]
struct GeminiEmbeddingRequest {
    model: String,
    content: GeminiContent,
}

#[derive(Serialize)]
struct GeminiBatchRequest {
    requests: Vec<GeminiEmbeddingRequest>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingValues,
}

#[derive(Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbeddingValues>,
}

#[derive(Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f64>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        let url = format!("{}/{}:embedContent", self.base_url, self.model_path());
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request(text))
            .send()
            .await?
            .error_for_status()?
            .json::<GeminiEmbeddingResponse>()
            .await?;

        Ok(resp.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = GeminiBatchRequest {
            requests: texts.iter().map(|t| self.request(t)).collect(),
        };
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model_path());

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GeminiBatchResponse>()
            .await?;

        if resp.embeddings.len() != texts.len() {
            bail!(
                "gemini returned {} embeddings for {} inputs",
                resp.embeddings.len(),
                texts.len()
            );
        }

        Ok(resp.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySearchRemoteConfig;

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let config = Config::default();
        match create_provider(&config) {
            Err(MemoryError::Configuration { field, .. }) => {
                assert_eq!(field, "memory.remote.apiKey")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("provider should not be created without a key"),
        }
    }

    #[test]
    fn provider_follows_config() {
        let mut config = Config::default();
        config.memory.provider = Some(EmbeddingProviderKind::Voyage);
        config.memory.dimensions = Some(512);
        config.memory.remote = Some(MemorySearchRemoteConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        });

        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.id(), "voyage");
        assert_eq!(provider.model(), DEFAULT_VOYAGE_EMBEDDING_MODEL);
        assert_eq!(provider.dimensions(), 512);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiEmbeddingProvider::new("k".into(), None)
            .with_base_url(Some("http://localhost:8080/v1/".into()));
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}
