/// Default configuration constants used across the memory engine.

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default Gemini embedding model.
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Default Mistral embedding model.
pub const DEFAULT_MISTRAL_EMBEDDING_MODEL: &str = "mistral-embed";

/// Default Voyage embedding model.
pub const DEFAULT_VOYAGE_EMBEDDING_MODEL: &str = "voyage-3";

/// Default embedding chunk size in tokens.
pub const DEFAULT_CHUNK_TOKENS: u32 = 400;

/// Default embedding chunk overlap.
pub const DEFAULT_CHUNK_OVERLAP: u32 = 80;

/// Default fusion weight for vector similarity.
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;

/// Default fusion weight for lexical similarity.
pub const DEFAULT_TEXT_WEIGHT: f64 = 0.3;

/// Default cap on returned search results.
pub const DEFAULT_MAX_RESULTS: usize = 6;

/// Default inclusive score floor.
pub const DEFAULT_MIN_SCORE: f64 = 0.35;

/// Maximum characters of chunk text returned as a snippet.
pub const SNIPPET_MAX_CHARS: usize = 700;

/// Default embedding batch max tokens.
pub const EMBEDDING_BATCH_MAX_TOKENS: usize = 8000;

/// Default embedding batch max items.
pub const EMBEDDING_BATCH_MAX_ITEMS: usize = 64;

/// Default embedding index concurrency.
pub const EMBEDDING_INDEX_CONCURRENCY: usize = 4;

/// Default embedding retry max attempts.
pub const EMBEDDING_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff between embedding retries.
pub const EMBEDDING_RETRY_BASE_DELAY_MS: u64 = 500;

/// Default remote embedding batch timeout (2 minutes).
pub const EMBEDDING_BATCH_TIMEOUT_REMOTE_MS: u64 = 2 * 60_000;

/// Default query embedding timeout.
pub const EMBEDDING_QUERY_TIMEOUT_MS: u64 = 60_000;

/// Default agent id used to name the persisted index.
pub const DEFAULT_AGENT_ID: &str = "main";
