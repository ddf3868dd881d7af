use std::time::Duration;

use crate::config::{
    MemorySearchConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_TOKENS, DEFAULT_MAX_RESULTS,
    DEFAULT_MIN_SCORE, DEFAULT_TEXT_WEIGHT, DEFAULT_VECTOR_WEIGHT, EMBEDDING_BATCH_MAX_ITEMS,
    EMBEDDING_BATCH_MAX_TOKENS, EMBEDDING_BATCH_TIMEOUT_REMOTE_MS, EMBEDDING_INDEX_CONCURRENCY,
    EMBEDDING_RETRY_BASE_DELAY_MS, EMBEDDING_RETRY_MAX_ATTEMPTS, SNIPPET_MAX_CHARS,
};

use super::error::{MemoryError, Result};

/// Immutable configuration of one memory engine instance.
///
/// Build it with [`MemoryConfig::default`] or
/// [`MemoryConfig::from_search_config`] and check it with
/// [`MemoryConfig::validate`]; the manager refuses invalid configs.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryConfig {
    /// Target chunk size in tokens (whitespace-separated words).
    pub tokens: usize,
    /// Tokens shared between consecutive chunks of a document.
    pub overlap: usize,
    /// Fusion weight of the vector score. Normalized against `text_weight`.
    pub vector_weight: f64,
    /// Fusion weight of the lexical score.
    pub text_weight: f64,
    /// Cap on returned results.
    pub max_results: usize,
    /// Inclusive floor on the fused score.
    pub min_score: f64,
    /// Maximum snippet length in characters.
    pub snippet_max_chars: usize,
    /// Upper bound on estimated tokens per embedding batch.
    pub batch_max_tokens: usize,
    /// Upper bound on chunks per embedding batch.
    pub batch_max_items: usize,
    /// Embedding batches in flight at once.
    pub concurrency: usize,
    /// Per-attempt provider timeout.
    pub timeout: Duration,
    /// Attempts per batch before it is recorded as failed.
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub retry_base_delay: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            tokens: DEFAULT_CHUNK_TOKENS as usize,
            overlap: DEFAULT_CHUNK_OVERLAP as usize,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            text_weight: DEFAULT_TEXT_WEIGHT,
            max_results: DEFAULT_MAX_RESULTS,
            min_score: DEFAULT_MIN_SCORE,
            snippet_max_chars: SNIPPET_MAX_CHARS,
            batch_max_tokens: EMBEDDING_BATCH_MAX_TOKENS,
            batch_max_items: EMBEDDING_BATCH_MAX_ITEMS,
            concurrency: EMBEDDING_INDEX_CONCURRENCY,
            timeout: Duration::from_millis(EMBEDDING_BATCH_TIMEOUT_REMOTE_MS),
            retry_attempts: EMBEDDING_RETRY_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(EMBEDDING_RETRY_BASE_DELAY_MS),
        }
    }
}

impl MemoryConfig {
    /// Resolve the user-facing `memory` config section, filling defaults, and
    /// validate the result.
    pub fn from_search_config(search: &MemorySearchConfig) -> Result<Self> {
        let config = Self::resolve(search);
        config.validate()?;
        Ok(config)
    }

    /// Overlay the user-facing `memory` section on the defaults without
    /// validating.
    pub fn resolve(search: &MemorySearchConfig) -> Self {
        let mut config = Self::default();

        if let Some(chunking) = &search.chunking {
            if let Some(tokens) = chunking.tokens {
                config.tokens = tokens as usize;
            }
            if let Some(overlap) = chunking.overlap {
                config.overlap = overlap as usize;
            }
        }

        if let Some(query) = &search.query {
            if let Some(max_results) = query.max_results {
                config.max_results = max_results;
            }
            if let Some(min_score) = query.min_score {
                config.min_score = min_score;
            }
            if let Some(chars) = query.snippet_max_chars {
                config.snippet_max_chars = chars;
            }
            if let Some(hybrid) = &query.hybrid {
                if let Some(w) = hybrid.vector_weight {
                    config.vector_weight = w;
                }
                if let Some(w) = hybrid.text_weight {
                    config.text_weight = w;
                }
            }
        }

        if let Some(sync) = &search.sync {
            if let Some(v) = sync.batch_max_tokens {
                config.batch_max_tokens = v;
            }
            if let Some(v) = sync.batch_max_items {
                config.batch_max_items = v;
            }
            if let Some(v) = sync.concurrency {
                config.concurrency = v;
            }
            if let Some(ms) = sync.timeout_ms {
                config.timeout = Duration::from_millis(ms);
            }
            if let Some(v) = sync.retry_attempts {
                config.retry_attempts = v;
            }
        }

        config
    }

    /// Check every invariant the engine relies on, failing on the first
    /// violation.
    pub fn validate(&self) -> Result<()> {
        match self.problems().into_iter().next() {
            Some((field, message)) => Err(MemoryError::configuration(field, message)),
            None => Ok(()),
        }
    }

    /// Every invariant violation, as `(field, message)` pairs.
    pub fn problems(&self) -> Vec<(&'static str, String)> {
        let mut problems = Vec::new();

        if self.tokens == 0 {
            problems.push(("chunking.tokens", "must be at least 1".to_string()));
        } else if self.overlap >= self.tokens {
            problems.push((
                "chunking.overlap",
                format!(
                    "overlap ({}) must be smaller than tokens ({})",
                    self.overlap, self.tokens
                ),
            ));
        }

        let mut weights_valid = true;
        for (field, weight) in [
            ("query.hybrid.vectorWeight", self.vector_weight),
            ("query.hybrid.textWeight", self.text_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                weights_valid = false;
                problems.push((field, "must be a finite, non-negative number".to_string()));
            }
        }
        if weights_valid && self.vector_weight + self.text_weight <= 0.0 {
            problems.push((
                "query.hybrid",
                "vectorWeight and textWeight cannot both be zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            problems.push(("query.minScore", "must be within [0, 1]".to_string()));
        }
        if self.batch_max_tokens == 0 {
            problems.push(("sync.batchMaxTokens", "must be at least 1".to_string()));
        }
        if self.batch_max_items == 0 {
            problems.push(("sync.batchMaxItems", "must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            problems.push(("sync.concurrency", "must be at least 1".to_string()));
        }
        if self.retry_attempts == 0 {
            problems.push(("sync.retryAttempts", "must be at least 1".to_string()));
        }

        problems
    }

    /// Fusion weights normalized to sum to 1, as `(vector, text)`.
    pub fn normalized_weights(&self) -> (f64, f64) {
        let total = self.vector_weight + self.text_weight;
        if total <= 0.0 {
            return (0.0, 0.0);
        }
        (self.vector_weight / total, self.text_weight / total)
    }

    /// Distance between the start of consecutive chunk windows.
    pub fn step(&self) -> usize {
        self.tokens.saturating_sub(self.overlap).max(1)
    }
}
