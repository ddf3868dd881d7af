use std::collections::BTreeMap;
use std::sync::Arc;

use super::chunking::Chunk;
use super::lexical::LexicalIndex;
use super::vector::VectorIndex;

/// Identity of an indexed chunk: its document plus its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub path: String,
    pub hash: String,
}

impl ChunkKey {
    pub fn new(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
        }
    }

    pub fn of(chunk: &Chunk) -> Self {
        Self::new(chunk.path.clone(), chunk.hash.clone())
    }
}

/// The persisted unit: chunk metadata plus its vector, if embedding succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    /// Collection the document belongs to (e.g. `memory`).
    pub source: String,
    /// `None` while the chunk is served lexical-only.
    pub vector: Option<Arc<[f64]>>,
}

impl IndexEntry {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::of(&self.chunk)
    }

    pub fn has_vector(&self) -> bool {
        self.vector.is_some()
    }
}

/// Per-document bookkeeping inside a generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileRecord {
    pub source: String,
    /// Chunk keys in document order.
    pub chunks: Vec<ChunkKey>,
}

/// An immutable snapshot of the whole index.
///
/// Built by a sync pass (or loaded from the store) and shared as
/// `Arc<Generation>`; readers keep the snapshot they started with while a
/// newer one is swapped in.
#[derive(Debug, Default)]
pub struct Generation {
    pub(crate) id: u64,
    pub(crate) entries: BTreeMap<ChunkKey, Arc<IndexEntry>>,
    pub(crate) files: BTreeMap<String, FileRecord>,
    pub(crate) lexical: LexicalIndex,
    pub(crate) vectors: VectorIndex,
}

impl Generation {
    /// The empty generation every engine starts from.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble a generation from entries grouped per file, deriving the
    /// lexical and vector indexes from scratch.
    pub fn from_entries(id: u64, files: BTreeMap<String, FileRecord>, entries: Vec<IndexEntry>) -> Self {
        let mut lexical = LexicalIndex::default();
        let mut vectors = VectorIndex::default();
        let mut map = BTreeMap::new();

        for entry in entries {
            let key = entry.key();
            lexical.index(&entry.chunk);
            if let Some(vector) = &entry.vector {
                vectors.insert(key.clone(), Arc::clone(vector));
            }
            map.insert(key, Arc::new(entry));
        }

        Self {
            id,
            entries: map,
            files,
            lexical,
            vectors,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }

    /// Entries currently served lexical-only.
    pub fn degraded_count(&self) -> usize {
        self.chunk_count() - self.vector_count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, key: &ChunkKey) -> Option<&Arc<IndexEntry>> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<IndexEntry>> {
        self.entries.values()
    }

    pub fn files(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }
}
