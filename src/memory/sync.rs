use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunking::{chunk_document, estimate_tokens};
use super::config::MemoryConfig;
use super::embeddings::EmbeddingProvider;
use super::error::{MemoryError, Result};
use super::generation::{ChunkKey, FileRecord, Generation, IndexEntry};
use super::lexical::LexicalIndex;
use super::source::{DocumentSource, SourceDocument};
use super::vector::VectorIndex;

/// Options for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Rebuild from empty, ignoring everything the current generation holds.
    pub force: bool,
}

impl SyncOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// What a sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Generation installed (or kept, when nothing changed).
    pub generation: u64,
    pub files: usize,
    pub chunks: usize,
    /// Chunks taken over unchanged from the previous generation.
    pub carried: usize,
    /// Chunks new to this generation.
    pub added: usize,
    /// Chunks whose vector came back from the provider during this pass.
    pub embedded: usize,
    /// New chunks that reused a vector of identical content.
    pub reused: usize,
    /// Chunks dropped because their content is gone.
    pub removed: usize,
    /// Chunks left without a vector after this pass.
    pub failed: usize,
    /// Provider calls made during the pass, retries included.
    pub provider_calls: usize,
    /// One message per failed embedding batch.
    pub provider_errors: Vec<String>,
    pub forced: bool,
    /// Whether the pass produced a generation different from the previous one.
    pub changed: bool,
}

impl SyncReport {
    /// Some chunks are being served lexical-only.
    pub fn is_degraded(&self) -> bool {
        self.failed > 0
    }
}

/// Builds the next generation from the corpus and the current generation.
///
/// Never touches the generation it is given; the caller decides whether to
/// install the result.
pub(crate) struct SyncManager {
    config: MemoryConfig,
    provider: Arc<dyn EmbeddingProvider>,
    source: Arc<dyn DocumentSource>,
}

impl SyncManager {
    pub(crate) fn new(
        config: MemoryConfig,
        provider: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            config,
            provider,
            source,
        }
    }

    /// Run one pass against `current`.
    ///
    /// Fails with `CorpusRead` when the document source fails and with
    /// `Closed` when `cancel` fires; embedding failures are recorded in the
    /// report instead.
    pub(crate) async fn run(
        &self,
        current: &Generation,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<(Generation, SyncReport)> {
        let docs = tokio::select! {
            _ = cancel.cancelled() => return Err(MemoryError::Closed),
            listed = self.source.list_documents() => {
                listed.map_err(|e| MemoryError::corpus_read(format!("{e:#}")))?
            }
        };
        let docs = dedupe_documents(docs);

        let empty = Generation::empty();
        let base = if force { &empty } else { current };

        let mut report = SyncReport {
            forced: force,
            ..Default::default()
        };
        let mut lexical: LexicalIndex = base.lexical.clone();
        let mut vectors: VectorIndex = base.vectors.clone();
        let mut entries: BTreeMap<ChunkKey, Arc<IndexEntry>> = BTreeMap::new();
        let mut files: BTreeMap<String, FileRecord> = BTreeMap::new();
        let mut metadata_changed = false;

        // Vectors of content seen anywhere in the base generation, so a chunk
        // moved or copied to another file is not embedded again.
        let reusable: HashMap<&str, &Arc<[f64]>> = base
            .entries
            .values()
            .filter_map(|e| e.vector.as_ref().map(|v| (e.chunk.hash.as_str(), v)))
            .collect();

        for doc in docs {
            let mut keys = Vec::new();

            for chunk in chunk_document(&doc.path, &doc.text, &self.config) {
                let key = ChunkKey::of(&chunk);
                if entries.contains_key(&key) {
                    // Repeated content within one document shares an identity.
                    continue;
                }
                keys.push(key.clone());

                if let Some(previous) = base.entries.get(&key) {
                    report.carried += 1;
                    let entry = if previous.chunk == chunk && previous.source == doc.source {
                        Arc::clone(previous)
                    } else {
                        // Same content at a different line range or under a new label.
                        metadata_changed = true;
                        Arc::new(IndexEntry {
                            chunk,
                            source: doc.source.clone(),
                            vector: previous.vector.clone(),
                        })
                    };
                    entries.insert(key, entry);
                    continue;
                }

                report.added += 1;
                lexical.index(&chunk);
                let vector = reusable.get(chunk.hash.as_str()).map(|v| Arc::clone(v));
                if let Some(v) = &vector {
                    vectors.insert(key.clone(), Arc::clone(v));
                    report.reused += 1;
                }
                entries.insert(
                    key,
                    Arc::new(IndexEntry {
                        chunk,
                        source: doc.source.clone(),
                        vector,
                    }),
                );
            }

            files.insert(
                doc.path,
                FileRecord {
                    source: doc.source,
                    chunks: keys,
                },
            );
        }

        for key in base.entries.keys() {
            if !entries.contains_key(key) {
                lexical.remove(&key.path, &key.hash);
                vectors.remove(&key.path, &key.hash);
                report.removed += 1;
            }
        }

        // Everything still lacking a vector, grouped by content so identical
        // text is sent to the provider once.
        let mut pending: BTreeMap<String, (String, Vec<ChunkKey>)> = BTreeMap::new();
        for (key, entry) in &entries {
            if entry.vector.is_none() {
                pending
                    .entry(key.hash.clone())
                    .or_insert_with(|| (entry.chunk.text.clone(), Vec::new()))
                    .1
                    .push(key.clone());
            }
        }

        if !pending.is_empty() {
            self.embed_pending(pending, &mut entries, &mut vectors, &mut report, cancel)
                .await?;
        }

        report.files = files.len();
        report.chunks = entries.len();
        report.failed = entries.values().filter(|e| e.vector.is_none()).count();
        report.changed = force
            || metadata_changed
            || report.added > 0
            || report.removed > 0
            || report.embedded > 0
            || files_changed(&base.files, &files);
        report.generation = if report.changed {
            current.id + 1
        } else {
            current.id
        };

        let next = Generation {
            id: report.generation,
            entries,
            files,
            lexical,
            vectors,
        };

        info!(
            generation = report.generation,
            files = report.files,
            chunks = report.chunks,
            added = report.added,
            removed = report.removed,
            embedded = report.embedded,
            failed = report.failed,
            forced = force,
            "memory sync pass complete"
        );

        Ok((next, report))
    }

    async fn embed_pending(
        &self,
        pending: BTreeMap<String, (String, Vec<ChunkKey>)>,
        entries: &mut BTreeMap<ChunkKey, Arc<IndexEntry>>,
        vectors: &mut VectorIndex,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (texts, groups): (Vec<String>, Vec<Vec<ChunkKey>>) = pending.into_values().unzip();
        let batches = plan_batches(&texts, &self.config);

        debug!(
            texts = texts.len(),
            batches = batches.len(),
            concurrency = self.config.concurrency,
            "embedding pending chunks"
        );

        let config = &self.config;
        let texts_ref = &texts;
        let work = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_idx, range)| {
                let provider = Arc::clone(&self.provider);
                async move {
                    let batch: Vec<String> = texts_ref[range.clone()].to_vec();
                    let outcome = embed_with_retry(provider.as_ref(), &batch, config).await;
                    (batch_idx, range, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>();

        let mut outcomes = tokio::select! {
            _ = cancel.cancelled() => return Err(MemoryError::Closed),
            outcomes = work => outcomes,
        };
        outcomes.sort_by_key(|(batch_idx, _, _)| *batch_idx);

        for (batch_idx, range, (calls, outcome)) in outcomes {
            report.provider_calls += calls;
            match outcome {
                Ok(batch_vectors) => {
                    for (offset, vector) in batch_vectors.into_iter().enumerate() {
                        let vector: Arc<[f64]> = Arc::from(vector);
                        for key in &groups[range.start + offset] {
                            let Some(entry) = entries.get_mut(key) else {
                                continue;
                            };
                            *entry = Arc::new(IndexEntry {
                                chunk: entry.chunk.clone(),
                                source: entry.source.clone(),
                                vector: Some(Arc::clone(&vector)),
                            });
                            vectors.insert(key.clone(), Arc::clone(&vector));
                            report.embedded += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        batch = batch_idx,
                        chunks = range.len(),
                        error = %e,
                        "embedding batch failed; chunks stay lexical-only until next sync"
                    );
                    report.provider_errors.push(e.to_string());
                }
            }
        }

        Ok(())
    }
}

/// Embed one batch, retrying with exponential backoff. Returns the number of
/// provider calls made alongside the outcome.
async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    config: &MemoryConfig,
) -> (usize, Result<Vec<Vec<f64>>>) {
    let mut delay = config.retry_base_delay;
    let mut attempt: u32 = 1;

    loop {
        let result = match tokio::time::timeout(config.timeout, provider.embed_batch(texts)).await {
            Ok(Ok(vectors)) => check_batch(vectors, texts.len(), provider.dimensions()),
            Ok(Err(e)) => Err(MemoryError::provider(format!("{e:#}"))),
            Err(_) => Err(MemoryError::provider(format!(
                "embedding batch timed out after {}ms",
                config.timeout.as_millis()
            ))),
        };

        match result {
            Ok(vectors) => return (attempt as usize, Ok(vectors)),
            Err(e) if attempt < config.retry_attempts => {
                debug!(attempt, error = %e, "retrying embedding batch");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return (attempt as usize, Err(e)),
        }
    }
}

/// A batch is usable only as a whole: right length, right dimensions, finite.
fn check_batch(vectors: Vec<Vec<f64>>, expected: usize, dimensions: usize) -> Result<Vec<Vec<f64>>> {
    if vectors.len() != expected {
        return Err(MemoryError::provider(format!(
            "provider returned {} vectors for {expected} inputs",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors
        .iter()
        .find(|v| v.len() != dimensions || v.iter().any(|x| !x.is_finite()))
    {
        return Err(MemoryError::provider(format!(
            "provider returned a malformed vector ({} dimensions, expected {dimensions})",
            bad.len()
        )));
    }
    Ok(vectors)
}

/// Split `texts` into contiguous ranges bounded by the configured token and
/// item budgets. A single oversized text gets a batch of its own.
fn plan_batches(texts: &[String], config: &MemoryConfig) -> Vec<std::ops::Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut tokens = 0;

    for (idx, text) in texts.iter().enumerate() {
        let t = estimate_tokens(text);
        let full = idx > start
            && (tokens + t > config.batch_max_tokens || idx - start >= config.batch_max_items);
        if full {
            batches.push(start..idx);
            start = idx;
            tokens = 0;
        }
        tokens += t;
    }
    if start < texts.len() {
        batches.push(start..texts.len());
    }

    batches
}

/// Keep the first document for each path.
fn dedupe_documents(docs: Vec<SourceDocument>) -> Vec<SourceDocument> {
    let mut seen: BTreeMap<String, SourceDocument> = BTreeMap::new();
    for doc in docs {
        if seen.contains_key(&doc.path) {
            warn!(path = %doc.path, "document source listed a path twice; keeping the first");
            continue;
        }
        seen.insert(doc.path.clone(), doc);
    }
    seen.into_values().collect()
}

fn files_changed(before: &BTreeMap<String, FileRecord>, after: &BTreeMap<String, FileRecord>) -> bool {
    before.len() != after.len()
        || before
            .iter()
            .zip(after.iter())
            .any(|((pa, fa), (pb, fb))| pa != pb || fa != fb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(token_counts: &[usize]) -> Vec<String> {
        token_counts
            .iter()
            .map(|n| vec!["w"; *n].join(" "))
            .collect()
    }

    #[test]
    fn batches_respect_token_budget() {
        let config = MemoryConfig {
            batch_max_tokens: 10,
            batch_max_items: 100,
            ..Default::default()
        };
        let batches = plan_batches(&texts(&[4, 4, 4, 12, 1]), &config);
        assert_eq!(batches, vec![0..2, 2..3, 3..4, 4..5]);
    }

    #[test]
    fn batches_respect_item_budget() {
        let config = MemoryConfig {
            batch_max_tokens: 1000,
            batch_max_items: 2,
            ..Default::default()
        };
        let batches = plan_batches(&texts(&[1, 1, 1, 1, 1]), &config);
        assert_eq!(batches, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn no_texts_no_batches() {
        assert!(plan_batches(&[], &MemoryConfig::default()).is_empty());
    }

    #[test]
    fn check_batch_rejects_partial_results() {
        assert!(check_batch(vec![vec![1.0, 0.0]], 2, 2).is_err());
        assert!(check_batch(vec![vec![1.0]], 1, 2).is_err());
        assert!(check_batch(vec![vec![f64::NAN, 0.0]], 1, 2).is_err());
        assert!(check_batch(vec![vec![1.0, 0.0]], 1, 2).is_ok());
    }

    #[test]
    fn duplicate_paths_keep_first() {
        let docs = dedupe_documents(vec![
            SourceDocument::new("a.md", "one", "memory"),
            SourceDocument::new("a.md", "two", "memory"),
        ]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "one");
    }
}
