use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use super::chunking::Chunk;
use super::generation::ChunkKey;

// Letters, digits and underscores; everything else separates terms.
static TERM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}_]+").expect("Invalid term regex pattern"));

/// Lowercased terms of `text`, in order, with repeats.
pub fn tokenize(text: &str) -> Vec<String> {
    TERM_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Inverted index over chunk text, providing the lexical half of hybrid search.
///
/// A chunk's raw score for a query is the sum, over the *distinct* query
/// terms present in the chunk, of `idf(term) * (1 + ln(tf))`. Every term
/// contribution is positive and independent of the other terms, so adding a
/// matching query term to a chunk can only raise its score, and two chunks
/// with identical text always score identically.
///
/// Cloning is how a sync pass derives the next generation's index without
/// touching the one readers are using.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    /// Term frequencies per chunk.
    docs: HashMap<ChunkKey, HashMap<String, u32>>,
    /// Chunks containing each term.
    postings: HashMap<String, BTreeSet<ChunkKey>>,
}

impl LexicalIndex {
    /// Add `chunk`, replacing any previous entry with the same key.
    pub fn index(&mut self, chunk: &Chunk) {
        let key = ChunkKey::of(chunk);
        self.remove(&key.path, &key.hash);

        let mut freqs: HashMap<String, u32> = HashMap::new();
        for term in tokenize(&chunk.text) {
            *freqs.entry(term).or_default() += 1;
        }
        for term in freqs.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(key.clone());
        }
        self.docs.insert(key, freqs);
    }

    /// Drop the chunk identified by `(path, hash)`. Unknown keys are ignored.
    pub fn remove(&mut self, path: &str, hash: &str) {
        let key = ChunkKey::new(path, hash);
        let Some(freqs) = self.docs.remove(&key) else {
            return;
        };
        for term in freqs.keys() {
            if let Some(keys) = self.postings.get_mut(term) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &ChunkKey) -> bool {
        self.docs.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Raw (unnormalized) scores for every chunk sharing a term with `query`.
    pub fn score_query(&self, query: &str) -> HashMap<ChunkKey, f64> {
        let mut scores: HashMap<ChunkKey, f64> = HashMap::new();
        if self.docs.is_empty() {
            return scores;
        }

        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        let total = self.docs.len() as f64;

        for term in &terms {
            let Some(keys) = self.postings.get(term) else {
                continue;
            };
            let idf = (1.0 + total / keys.len() as f64).ln();
            for key in keys {
                let tf = self
                    .docs
                    .get(key)
                    .and_then(|freqs| freqs.get(term))
                    .copied()
                    .unwrap_or(0);
                if tf == 0 {
                    continue;
                }
                *scores.entry(key.clone()).or_default() += idf * (1.0 + (tf as f64).ln());
            }
        }

        scores
    }
}
