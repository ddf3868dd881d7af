use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::config::MemoryConfig;
use super::generation::ChunkKey;

/// Knobs for a single fusion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOptions {
    pub vector_weight: f64,
    pub text_weight: f64,
    pub min_score: f64,
    pub max_results: usize,
}

impl FusionOptions {
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

impl From<&MemoryConfig> for FusionOptions {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            vector_weight: config.vector_weight,
            text_weight: config.text_weight,
            min_score: config.min_score,
            max_results: config.max_results,
        }
    }
}

/// One fused candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub key: ChunkKey,
    pub start_line: u32,
    /// Fused score in `[0, 1]`.
    pub score: f64,
    pub vector_score: f64,
    pub text_score: f64,
}

/// Merge normalized lexical and vector scores into one ranked list.
///
/// Every key present in either map is a candidate; a key missing from one map
/// contributes `0` for that signal. The fused score is
/// `wv * vector + wt * text` with the two weights rescaled to sum to 1.
/// Candidates below `min_score` are dropped, the rest are ordered by score
/// descending, then path, start line and hash ascending, and truncated to
/// `max_results`.
///
/// `start_line` resolves a key to its chunk's first line for tie-breaking.
pub fn rank(
    lexical: &HashMap<ChunkKey, f64>,
    vector: &HashMap<ChunkKey, f64>,
    options: FusionOptions,
    start_line: impl Fn(&ChunkKey) -> u32,
) -> Vec<RankedChunk> {
    if options.max_results == 0 {
        return Vec::new();
    }

    let total = options.vector_weight + options.text_weight;
    if !(total > 0.0) {
        return Vec::new();
    }
    let wv = options.vector_weight / total;
    let wt = options.text_weight / total;

    let candidates: HashSet<&ChunkKey> = lexical.keys().chain(vector.keys()).collect();

    let mut ranked: Vec<RankedChunk> = candidates
        .into_iter()
        .filter_map(|key| {
            let vector_score = vector.get(key).copied().unwrap_or(0.0);
            let text_score = lexical.get(key).copied().unwrap_or(0.0);
            let score = (wv * vector_score + wt * text_score).clamp(0.0, 1.0);
            (score >= options.min_score).then(|| RankedChunk {
                key: key.clone(),
                start_line: start_line(key),
                score,
                vector_score,
                text_score,
            })
        })
        .collect();

    ranked.sort_by(compare_ranked);
    ranked.truncate(options.max_results);
    ranked
}

fn compare_ranked(a: &RankedChunk, b: &RankedChunk) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.key.path.cmp(&b.key.path))
        .then_with(|| a.start_line.cmp(&b.start_line))
        .then_with(|| a.key.hash.cmp(&b.key.hash))
}

/// Scale raw scores into `[0, 1]` by dividing by the largest score of the
/// candidate set.
///
/// The floor stays at zero so that every matching candidate keeps a non-zero
/// score. If the maximum is not positive, every entry is mapped to `0.0`.
pub fn normalise_scores(scores: &mut HashMap<ChunkKey, f64>) {
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);

    if !(max > 0.0) || !max.is_finite() {
        for score in scores.values_mut() {
            *score = 0.0;
        }
        return;
    }

    for score in scores.values_mut() {
        *score = (*score / max).clamp(0.0, 1.0);
    }
}
