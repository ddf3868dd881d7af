use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_AGENT_ID, EMBEDDING_QUERY_TIMEOUT_MS};

use super::config::MemoryConfig;
use super::embeddings::{create_provider, EmbeddingProvider};
use super::error::{MemoryError, Result};
use super::generation::Generation;
use super::hybrid::{normalise_scores, rank, FusionOptions};
use super::search::{MemorySearchOptions, MemorySearchResult};
use super::source::{DocumentSource, FsDocumentSource};
use super::store::{LoadOutcome, MemoryStore, StoreFingerprint};
use super::sync::{SyncManager, SyncOptions, SyncReport};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Describes the current state of a `MemoryIndexManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemoryProviderStatus {
    /// Manager is initialised and ready to serve queries.
    Ready,
    /// A sync pass is currently in progress.
    Syncing,
    /// The manager has been closed and can no longer be used.
    Closed,
    /// The last sync pass failed; the previous generation is still served.
    Error,
}

/// Snapshot of the index counters, read from the current generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatus {
    pub file_count: usize,
    pub chunk_count: usize,
    pub vector_count: usize,
    /// Chunks served lexical-only until a later sync embeds them.
    pub degraded_count: usize,
    pub generation: u64,
    pub provider: String,
    pub model: String,
    pub state: MemoryProviderStatus,
    /// The next sync rebuilds from scratch.
    pub needs_full_resync: bool,
    pub store_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// MemoryIndexManager
// ---------------------------------------------------------------------------

struct ManagerInner {
    config: MemoryConfig,
    provider: Arc<dyn EmbeddingProvider>,
    syncer: SyncManager,
    current: RwLock<Arc<Generation>>,
    /// Held for the whole of a sync pass; a second caller waits its turn.
    sync_lock: tokio::sync::Mutex<()>,
    store: Arc<Mutex<Option<MemoryStore>>>,
    store_path: Option<PathBuf>,
    status: Mutex<MemoryProviderStatus>,
    closed: AtomicBool,
    needs_full_resync: AtomicBool,
    cancel: CancellationToken,
    agent_id: String,
}

/// Hybrid lexical + vector search over an agent's memory documents.
///
/// Readers (`search`, `status`) work on the generation that is current when
/// they start and never wait for a sync. `sync` builds the next generation
/// off to the side and swaps it in at the end. The handle is cheaply
/// cloneable; all clones share one index.
#[derive(Clone)]
pub struct MemoryIndexManager {
    inner: Arc<ManagerInner>,
}

impl MemoryIndexManager {
    /// Create an in-memory engine with no persistence.
    ///
    /// Fails with a configuration error if `config` does not validate.
    pub fn new(
        config: MemoryConfig,
        provider: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn DocumentSource>,
    ) -> Result<Self> {
        Self::build(config, provider, source, None, DEFAULT_AGENT_ID)
    }

    /// Create an engine backed by `store`, serving whatever generation it
    /// holds until the first sync.
    pub fn with_store(
        config: MemoryConfig,
        provider: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn DocumentSource>,
        store: MemoryStore,
    ) -> Result<Self> {
        Self::build(config, provider, source, Some(store), DEFAULT_AGENT_ID)
    }

    /// Open the memory index described by the application config: remote
    /// embedding provider, workspace document source and SQLite store under
    /// the state directory. Runs one sync when `memory.sync.onBoot` is set.
    pub async fn open(config: &Config) -> Result<Self> {
        let memory_config = MemoryConfig::from_search_config(&config.memory)?;
        let provider = create_provider(config)?;
        let source: Arc<dyn DocumentSource> = Arc::new(
            FsDocumentSource::new(config.workspace_dir())
                .with_extra_paths(config.memory.extra_paths.iter().map(PathBuf::from)),
        );
        let agent_id = config
            .memory
            .agent_id
            .as_deref()
            .unwrap_or(DEFAULT_AGENT_ID);

        let store = match config.memory_store_path() {
            Some(path) => {
                tokio::task::spawn_blocking(move || MemoryStore::open(&path)).await??
            }
            None => MemoryStore::open_in_memory()?,
        };

        let manager = Self::build(memory_config, provider, source, Some(store), agent_id)?;

        let on_boot = config
            .memory
            .sync
            .as_ref()
            .and_then(|s| s.on_boot)
            .unwrap_or(false);
        if on_boot {
            if let Err(e) = manager.sync(SyncOptions::default()).await {
                warn!(agent_id, error = %e, "memory sync on boot failed");
            }
        }

        Ok(manager)
    }

    fn build(
        config: MemoryConfig,
        provider: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn DocumentSource>,
        store: Option<MemoryStore>,
        agent_id: &str,
    ) -> Result<Self> {
        config.validate()?;

        let fingerprint = fingerprint_of(provider.as_ref());
        let mut initial = Generation::empty();
        let mut needs_full_resync = false;
        let store_path = store.as_ref().and_then(|s| s.path().map(PathBuf::from));

        if let Some(store) = &store {
            match store.load(&fingerprint)? {
                LoadOutcome::Empty => debug!(agent_id, "no persisted memory index"),
                LoadOutcome::Loaded(generation) => initial = generation,
                LoadOutcome::Corrupt(reason) => {
                    warn!(agent_id, reason = %reason, "persisted memory index failed integrity check; full resync required");
                    needs_full_resync = true;
                }
            }
        }

        info!(
            agent_id,
            provider = provider.id(),
            model = provider.model(),
            generation = initial.id(),
            chunks = initial.chunk_count(),
            "memory index manager ready"
        );

        let syncer = SyncManager::new(config.clone(), Arc::clone(&provider), source);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                provider,
                syncer,
                current: RwLock::new(Arc::new(initial)),
                sync_lock: tokio::sync::Mutex::new(()),
                store: Arc::new(Mutex::new(store)),
                store_path,
                status: Mutex::new(MemoryProviderStatus::Ready),
                closed: AtomicBool::new(false),
                needs_full_resync: AtomicBool::new(needs_full_resync),
                cancel: CancellationToken::new(),
                agent_id: agent_id.to_string(),
            }),
        })
    }

    /// Execute a hybrid search and return results sorted by descending
    /// score. An empty or blank query, or an empty index, yields no results.
    ///
    /// When no query vector is available (nothing embedded yet, or the query
    /// embedding failed) results are ranked on the lexical score alone.
    pub async fn search(
        &self,
        query: &str,
        opts: MemorySearchOptions,
    ) -> Result<Vec<MemorySearchResult>> {
        self.ensure_open()?;
        let generation = self.snapshot();

        let mut options = FusionOptions::from(&self.inner.config);
        if let Some(max_results) = opts.max_results {
            options.max_results = max_results;
        }
        if let Some(min_score) = opts.min_score {
            options.min_score = min_score;
        }

        let query = query.trim();
        if query.is_empty() || generation.is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        let mut lexical = generation.lexical().score_query(query);
        normalise_scores(&mut lexical);

        let query_vector = if !generation.vectors().is_empty() {
            self.embed_query(query).await
        } else {
            None
        };
        let vector = match &query_vector {
            Some(query_vector) => generation.vectors().score_query(query_vector),
            None => {
                // No vector signal for this query; rank on the lexical score alone.
                options.vector_weight = 0.0;
                HashMap::new()
            }
        };

        let ranked = rank(&lexical, &vector, options, |key| {
            generation.entry(key).map(|e| e.chunk.start_line).unwrap_or(0)
        });

        let results: Vec<MemorySearchResult> = ranked
            .into_iter()
            .filter_map(|r| {
                generation.entry(&r.key).map(|entry| {
                    MemorySearchResult::from_entry(entry, r.score, self.inner.config.snippet_max_chars)
                })
            })
            .collect();

        debug!(
            agent_id = %self.inner.agent_id,
            generation = generation.id(),
            lexical = lexical.len(),
            vector = vector.len(),
            results = results.len(),
            "memory search"
        );
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f64>> {
        let limit = Duration::from_millis(EMBEDDING_QUERY_TIMEOUT_MS).min(self.inner.config.timeout);
        match tokio::time::timeout(limit, self.inner.provider.embed_query(query)).await {
            Ok(Ok(v)) if v.iter().all(|x| x.is_finite()) => Some(v),
            Ok(Ok(_)) => {
                warn!("query embedding contained non-finite values; using lexical scores only");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "query embedding failed; using lexical scores only");
                None
            }
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "query embedding timed out; using lexical scores only");
                None
            }
        }
    }

    /// Bring the index in line with the document source.
    ///
    /// Waits for any sync already in flight. Embedding failures are absorbed
    /// and counted in the report; a corpus read failure aborts the pass and
    /// leaves the current generation in place.
    pub async fn sync(&self, opts: SyncOptions) -> Result<SyncReport> {
        self.ensure_open()?;
        let _guard = self.inner.sync_lock.lock().await;
        self.ensure_open()?;

        let force = opts.force || self.inner.needs_full_resync.load(Ordering::SeqCst);
        *self.inner.status.lock() = MemoryProviderStatus::Syncing;

        let current = self.snapshot();
        let outcome = self.inner.syncer.run(&current, force, &self.inner.cancel).await;

        let (next, report) = match outcome {
            Ok(built) => built,
            Err(e) => {
                if !self.inner.closed.load(Ordering::SeqCst) {
                    *self.inner.status.lock() = MemoryProviderStatus::Error;
                    warn!(agent_id = %self.inner.agent_id, error = %e, "memory sync failed");
                }
                return Err(e);
            }
        };

        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(MemoryError::Closed);
        }

        if report.changed {
            let next = Arc::new(next);
            self.persist(Arc::clone(&next)).await;
            *self.inner.current.write() = next;
        }
        self.inner.needs_full_resync.store(false, Ordering::SeqCst);
        *self.inner.status.lock() = MemoryProviderStatus::Ready;

        Ok(report)
    }

    async fn persist(&self, generation: Arc<Generation>) {
        let store = Arc::clone(&self.inner.store);
        let fingerprint = fingerprint_of(self.inner.provider.as_ref());
        let saved = tokio::task::spawn_blocking(move || match store.lock().as_mut() {
            Some(store) => store.save(&generation, &fingerprint),
            None => Ok(()),
        })
        .await;

        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist memory index; serving it from memory"),
            Err(e) => warn!(error = %e, "memory persist task failed"),
        }
    }

    /// Counters of the current generation. Never triggers a sync.
    pub fn status(&self) -> Result<MemoryStatus> {
        self.ensure_open()?;
        let generation = self.snapshot();
        Ok(MemoryStatus {
            file_count: generation.file_count(),
            chunk_count: generation.chunk_count(),
            vector_count: generation.vector_count(),
            degraded_count: generation.degraded_count(),
            generation: generation.id(),
            provider: self.inner.provider.id().to_string(),
            model: self.inner.provider.model().to_string(),
            state: *self.inner.status.lock(),
            needs_full_resync: self.inner.needs_full_resync.load(Ordering::SeqCst),
            store_path: self.inner.store_path.clone(),
        })
    }

    /// Close the manager. An in-flight sync is abandoned without installing
    /// its result; the call returns once it has stopped and the store handle
    /// is released. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();

        let _guard = self.inner.sync_lock.lock().await;
        let store = self.inner.store.lock().take();
        drop(store);
        *self.inner.status.lock() = MemoryProviderStatus::Closed;
        info!(agent_id = %self.inner.agent_id, "memory index manager closed");
    }

    /// The generation currently served to readers.
    pub fn generation(&self) -> Arc<Generation> {
        self.snapshot()
    }

    fn snapshot(&self) -> Arc<Generation> {
        Arc::clone(&self.inner.current.read())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(MemoryError::Closed)
        } else {
            Ok(())
        }
    }
}

fn fingerprint_of(provider: &dyn EmbeddingProvider) -> StoreFingerprint {
    StoreFingerprint {
        provider: provider.id().to_string(),
        model: provider.model().to_string(),
        dimensions: provider.dimensions(),
    }
}
