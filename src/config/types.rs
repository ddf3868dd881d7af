use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    pub json: Option<bool>,
}

// ============================================================================
// Memory Search Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Openai,
    Gemini,
    Mistral,
    Voyage,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "gemini" | "google" => Ok(Self::Gemini),
            "mistral" => Ok(Self::Mistral),
            "voyage" => Ok(Self::Voyage),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Openai => "openai",
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
            Self::Voyage => "voyage",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchConfig {
    pub enabled: Option<bool>,
    /// Agent id used to name the persisted index file.
    pub agent_id: Option<String>,
    #[serde(default)]
    pub extra_paths: Vec<String>,
    pub provider: Option<EmbeddingProviderKind>,
    pub remote: Option<MemorySearchRemoteConfig>,
    pub model: Option<String>,
    /// Vector dimensions reported by the model, when it differs from the
    /// provider's default.
    pub dimensions: Option<usize>,
    pub store: Option<MemorySearchStoreConfig>,
    pub chunking: Option<MemorySearchChunkingConfig>,
    pub sync: Option<MemorySearchSyncConfig>,
    pub query: Option<MemorySearchQueryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchRemoteConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchStoreConfig {
    /// Explicit SQLite path. `:memory:` disables persistence.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchChunkingConfig {
    pub tokens: Option<u32>,
    pub overlap: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchSyncConfig {
    pub on_boot: Option<bool>,
    pub batch_max_tokens: Option<usize>,
    pub batch_max_items: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchQueryConfig {
    pub max_results: Option<usize>,
    pub min_score: Option<f64>,
    pub snippet_max_chars: Option<usize>,
    pub hybrid: Option<MemorySearchHybridConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchHybridConfig {
    pub vector_weight: Option<f64>,
    pub text_weight: Option<f64>,
}

impl MemorySearchConfig {
    /// Resolve the API key for the configured provider.
    pub fn api_key(&self) -> Option<String> {
        self.remote
            .as_ref()
            .and_then(|r| r.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    /// Store `key` as the remote API key unless one is already configured.
    pub fn apply_api_key(&mut self, key: &str) {
        let remote = self.remote.get_or_insert_with(Default::default);
        if remote.api_key.is_none() {
            remote.api_key = Some(key.to_string());
        }
    }
}
