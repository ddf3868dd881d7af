mod chunking;
mod config;
mod embeddings;
mod error;
mod generation;
mod hybrid;
mod lexical;
mod manager;
mod schema;
mod search;
mod source;
mod store;
mod sync;
mod vector;

pub use chunking::{chunk_document, estimate_tokens, hash_text, Chunk};
pub use config::MemoryConfig;
pub use embeddings::{
    create_provider, EmbeddingProvider, GeminiEmbeddingProvider, OpenAiEmbeddingProvider,
};
pub use error::{MemoryError, Result};
pub use generation::{ChunkKey, FileRecord, Generation, IndexEntry};
pub use hybrid::{normalise_scores, rank, FusionOptions, RankedChunk};
pub use lexical::{tokenize, LexicalIndex};
pub use manager::{MemoryIndexManager, MemoryProviderStatus, MemoryStatus};
pub use search::{format_citation, MemorySearchOptions, MemorySearchResult};
pub use source::{
    DocumentSource, FsDocumentSource, SourceDocument, StaticDocumentSource, SOURCE_EXTRA,
    SOURCE_MEMORY,
};
pub use store::{LoadOutcome, MemoryStore, StoreFingerprint};
pub use sync::{SyncOptions, SyncReport};
pub use vector::{cosine_similarity, VectorIndex};

use crate::config::Config;

/// Search memory for relevant content matching `query`.
///
/// Opens the agent's persisted index with the configured provider, runs one
/// hybrid search against it and closes it again. Long-lived callers should
/// hold a [`MemoryIndexManager`] instead.
pub async fn search(
    config: &Config,
    query: &str,
    opts: MemorySearchOptions,
) -> Result<Vec<MemorySearchResult>> {
    let manager = MemoryIndexManager::open(config).await?;
    let results = manager.search(query, opts).await;
    manager.close().await;
    results
}
