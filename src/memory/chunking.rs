use sha2::{Digest, Sha256};

use super::config::MemoryConfig;

/// A contiguous slice of one document, the unit of indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Source document identity.
    pub path: String,
    /// 1-based start line in the original document (inclusive).
    pub start_line: u32,
    /// 1-based end line in the original document (inclusive).
    pub end_line: u32,
    /// The raw document text covered by the token window.
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub hash: String,
    /// Whitespace tokens in the window.
    pub token_count: u32,
}

/// Hex SHA-256 digest of `text`.
pub fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Rough token estimate used for batching decisions.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `text` into windows of `config.tokens` tokens, consecutive windows
/// sharing `config.overlap` tokens.
///
/// Tokens are whitespace-separated words. Each chunk carries the exact source
/// slice from its first token to its last, so identical content always hashes
/// identically regardless of where it appears. The final window may be
/// shorter than `config.tokens`.
pub fn chunk_document(path: &str, text: &str, config: &MemoryConfig) -> Vec<Chunk> {
    let spans = token_spans(text);
    if spans.is_empty() {
        return Vec::new();
    }

    let line_starts = line_starts(text);
    let window = config.tokens.max(1);
    let step = config.step();

    let mut chunks = Vec::with_capacity(spans.len() / step + 1);
    let mut start = 0usize;
    loop {
        let end = (start + window).min(spans.len());
        let byte_start = spans[start].0;
        let byte_end = spans[end - 1].1;
        let slice = &text[byte_start..byte_end];

        chunks.push(Chunk {
            path: path.to_string(),
            start_line: line_of(&line_starts, byte_start),
            end_line: line_of(&line_starts, byte_end - 1),
            text: slice.to_string(),
            hash: hash_text(slice),
            token_count: (end - start) as u32,
        });

        if end == spans.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Byte ranges of whitespace-separated tokens.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(start) = current.take() {
                spans.push((start, idx));
            }
        } else if current.is_none() {
            current = Some(idx);
        }
    }
    if let Some(start) = current {
        spans.push((start, text.len()));
    }

    spans
}

/// Byte offset at which each line begins.
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
        .collect()
}

/// 1-based line containing byte `offset`.
fn line_of(line_starts: &[usize], offset: usize) -> u32 {
    line_starts.partition_point(|&start| start <= offset) as u32
}
