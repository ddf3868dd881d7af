use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::chunking::{hash_text, Chunk};
use super::error::Result;
use super::generation::{FileRecord, Generation, IndexEntry};
use super::schema;

/// Embedding model a persisted generation was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFingerprint {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

/// Result of reading the persisted generation.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Nothing has been persisted yet.
    Empty,
    Loaded(Generation),
    /// The stored data failed an integrity check and must not be served.
    Corrupt(String),
}

/// SQLite persistence for the most recently installed generation.
///
/// Only entries are stored; lexical and vector indexes are derived on load.
pub struct MemoryStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Open or create the store at `path`, creating parent directories and
    /// applying schema migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::run_migrations(&conn)?;
        debug!(db = %path.display(), "memory store opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// A store that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the persisted generation, checking it against `expected`.
    pub fn load(&self, expected: &StoreFingerprint) -> Result<LoadOutcome> {
        let file_rows: Vec<(String, String)> = {
            let mut stmt = self.conn.prepare("SELECT path, source FROM files ORDER BY path")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            match rows.collect::<rusqlite::Result<_>>() {
                Ok(rows) => rows,
                Err(e) if is_decode_error(&e) => {
                    return Ok(LoadOutcome::Corrupt(format!("unreadable file row: {e}")))
                }
                Err(e) => return Err(e.into()),
            }
        };

        let chunk_rows: Vec<ChunkRow> = {
            let mut stmt = self.conn.prepare(
                "SELECT path, hash, start_line, end_line, token_count, text, source, embedding
                 FROM chunks ORDER BY path, start_line, hash",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ChunkRow {
                    path: row.get(0)?,
                    hash: row.get(1)?,
                    start_line: row.get(2)?,
                    end_line: row.get(3)?,
                    token_count: row.get(4)?,
                    text: row.get(5)?,
                    source: row.get(6)?,
                    embedding: row.get(7)?,
                })
            })?;
            match rows.collect::<rusqlite::Result<_>>() {
                Ok(rows) => rows,
                Err(e) if is_decode_error(&e) => {
                    return Ok(LoadOutcome::Corrupt(format!("unreadable chunk row: {e}")))
                }
                Err(e) => return Err(e.into()),
            }
        };

        if file_rows.is_empty() && chunk_rows.is_empty() {
            return Ok(LoadOutcome::Empty);
        }

        match self.fingerprint() {
            Some(stored) if stored == *expected => {}
            Some(stored) => {
                return Ok(LoadOutcome::Corrupt(format!(
                    "index was built with {}/{} ({} dims), provider is {}/{} ({} dims)",
                    stored.provider,
                    stored.model,
                    stored.dimensions,
                    expected.provider,
                    expected.model,
                    expected.dimensions
                )))
            }
            None => {
                return Ok(LoadOutcome::Corrupt(
                    "index has entries but no model metadata".to_string(),
                ))
            }
        }

        let generation_id = schema::get_meta(&self.conn, "generation")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let mut files: BTreeMap<String, FileRecord> = file_rows
            .into_iter()
            .map(|(path, source)| {
                (
                    path,
                    FileRecord {
                        source,
                        chunks: Vec::new(),
                    },
                )
            })
            .collect();

        let mut entries = Vec::with_capacity(chunk_rows.len());
        for row in chunk_rows {
            let entry = match row.into_entry(expected.dimensions) {
                Ok(entry) => entry,
                Err(reason) => return Ok(LoadOutcome::Corrupt(reason)),
            };
            let Some(file) = files.get_mut(&entry.chunk.path) else {
                return Ok(LoadOutcome::Corrupt(format!(
                    "chunk references unknown file '{}'",
                    entry.chunk.path
                )));
            };
            file.chunks.push(entry.key());
            entries.push(entry);
        }

        let generation = Generation::from_entries(generation_id, files, entries);
        info!(
            generation = generation.id(),
            files = generation.file_count(),
            chunks = generation.chunk_count(),
            "loaded persisted memory index"
        );
        Ok(LoadOutcome::Loaded(generation))
    }

    /// Replace the persisted state with `generation` in one transaction.
    pub fn save(&mut self, generation: &Generation, fingerprint: &StoreFingerprint) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM files", [])?;

        {
            let mut insert_file = tx.prepare("INSERT INTO files (path, source) VALUES (?1, ?2)")?;
            for (path, record) in generation.files() {
                insert_file.execute(params![path, record.source])?;
            }

            let mut insert_chunk = tx.prepare(
                "INSERT INTO chunks
                    (path, hash, start_line, end_line, token_count, text, source, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for entry in generation.entries() {
                let chunk = &entry.chunk;
                insert_chunk.execute(params![
                    chunk.path,
                    chunk.hash,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.token_count,
                    chunk.text,
                    entry.source,
                    entry.vector.as_deref().map(encode_vector),
                ])?;
            }
        }

        schema::set_meta(&tx, "provider", &fingerprint.provider)?;
        schema::set_meta(&tx, "model", &fingerprint.model)?;
        schema::set_meta(&tx, "dimensions", &fingerprint.dimensions.to_string())?;
        schema::set_meta(&tx, "generation", &generation.id().to_string())?;
        schema::set_meta(&tx, "updated_at", &chrono::Utc::now().to_rfc3339())?;
        tx.commit()?;

        debug!(
            generation = generation.id(),
            chunks = generation.chunk_count(),
            "persisted memory index"
        );
        Ok(())
    }

    fn fingerprint(&self) -> Option<StoreFingerprint> {
        Some(StoreFingerprint {
            provider: schema::get_meta(&self.conn, "provider")?,
            model: schema::get_meta(&self.conn, "model")?,
            dimensions: schema::get_meta(&self.conn, "dimensions")?.parse().ok()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

struct ChunkRow {
    path: String,
    hash: String,
    start_line: i64,
    end_line: i64,
    token_count: i64,
    text: String,
    source: String,
    embedding: Option<Vec<u8>>,
}

impl ChunkRow {
    fn into_entry(self, dimensions: usize) -> std::result::Result<IndexEntry, String> {
        let locator = format!("{}@{}", self.path, self.hash);

        let (Ok(start_line), Ok(end_line)) =
            (u32::try_from(self.start_line), u32::try_from(self.end_line))
        else {
            return Err(format!(
                "{locator}: line range {}-{} out of bounds",
                self.start_line, self.end_line
            ));
        };
        if start_line < 1 || end_line < start_line {
            return Err(format!("{locator}: invalid line range {start_line}-{end_line}"));
        }
        let token_count = u32::try_from(self.token_count)
            .map_err(|_| format!("{locator}: invalid token count {}", self.token_count))?;
        if hash_text(&self.text) != self.hash {
            return Err(format!("{locator}: text does not match its hash"));
        }

        let vector = match self.embedding {
            Some(blob) => {
                let vector = decode_vector(&blob)
                    .ok_or_else(|| format!("{locator}: malformed embedding blob"))?;
                if vector.len() != dimensions {
                    return Err(format!(
                        "{locator}: embedding has {} dimensions, expected {dimensions}",
                        vector.len()
                    ));
                }
                Some(Arc::from(vector))
            }
            None => None,
        };

        Ok(IndexEntry {
            chunk: Chunk {
                path: self.path,
                start_line,
                end_line,
                text: self.text,
                hash: self.hash,
                token_count,
            },
            source: self.source,
            vector,
        })
    }
}

/// A row whose columns do not hold the expected types.
fn is_decode_error(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

fn encode_vector(vector: &[f64]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Option<Vec<f64>> {
    if blob.len() % 8 != 0 {
        return None;
    }
    let values: Vec<f64> = blob
        .chunks_exact(8)
        .map(|bytes| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            f64::from_le_bytes(buf)
        })
        .collect();
    values.iter().all(|v| v.is_finite()).then_some(values)
}
