use serde::{Deserialize, Serialize};

use super::generation::IndexEntry;

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// A single search result returned by the memory subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchResult {
    /// Source document path.
    pub path: String,
    /// First line number of the matched chunk (1-based, inclusive).
    pub start_line: u32,
    /// Last line number of the matched chunk (1-based, inclusive).
    pub end_line: u32,
    /// Fused relevance score in the range `[0.0, 1.0]`.
    pub score: f64,
    /// Trimmed chunk text, capped at the configured snippet length.
    pub snippet: String,
    /// Collection the document belongs to.
    pub source: String,
    /// Human-readable locator, e.g. `memory/2024-01-15.md:12-40`.
    pub citation: String,
}

impl MemorySearchResult {
    pub(crate) fn from_entry(entry: &IndexEntry, score: f64, snippet_max_chars: usize) -> Self {
        let chunk = &entry.chunk;
        Self {
            path: chunk.path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            score,
            snippet: snippet(&chunk.text, snippet_max_chars),
            source: entry.source.clone(),
            citation: format_citation(&chunk.path, chunk.start_line, chunk.end_line),
        }
    }
}

/// `path:start-end`, or `path:line` for a single-line chunk.
pub fn format_citation(path: &str, start_line: u32, end_line: u32) -> String {
    if start_line == end_line {
        format!("{path}:{start_line}")
    } else {
        format!("{path}:{start_line}-{end_line}")
    }
}

/// Trim `text` and cap it at `max_chars` characters.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-call overrides for a memory search. `None` keeps the engine default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySearchOptions {
    /// Maximum number of results to return.
    pub max_results: Option<usize>,
    /// Minimum relevance score to include a result.
    pub min_score: Option<f64>,
}

impl MemorySearchOptions {
    pub fn max_results(max_results: usize) -> Self {
        Self {
            max_results: Some(max_results),
            ..Default::default()
        }
    }
}
