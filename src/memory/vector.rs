use std::collections::HashMap;
use std::sync::Arc;

use ndarray::ArrayView1;

use super::generation::ChunkKey;

/// Chunk key to embedding vector, scored by cosine similarity.
///
/// Entries whose embedding failed are simply absent here; they still live in
/// the generation and the lexical index.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    vectors: HashMap<ChunkKey, Arc<[f64]>>,
}

impl VectorIndex {
    pub fn insert(&mut self, key: ChunkKey, vector: Arc<[f64]>) {
        self.vectors.insert(key, vector);
    }

    pub fn remove(&mut self, path: &str, hash: &str) {
        self.vectors.remove(&ChunkKey::new(path, hash));
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Cosine similarity of every stored vector against `query`, mapped from
    /// `[-1, 1]` to `[0, 1]`.
    ///
    /// Vectors with a different dimensionality, or a zero norm on either
    /// side, are skipped rather than scored.
    pub fn score_query(&self, query: &[f64]) -> HashMap<ChunkKey, f64> {
        let query_view = ArrayView1::from(query);
        let query_norm = query_view.dot(&query_view).sqrt();
        if query_norm == 0.0 || !query_norm.is_finite() {
            return HashMap::new();
        }

        self.vectors
            .iter()
            .filter_map(|(key, vector)| {
                cosine_with_norm(&query_view, query_norm, vector)
                    .map(|cos| (key.clone(), (cos + 1.0) / 2.0))
            })
            .collect()
    }
}

/// Cosine similarity of two vectors, `None` when undefined.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    let a_view = ArrayView1::from(a);
    let a_norm = a_view.dot(&a_view).sqrt();
    if a_norm == 0.0 {
        return None;
    }
    cosine_with_norm(&a_view, a_norm, b)
}

fn cosine_with_norm(a: &ArrayView1<'_, f64>, a_norm: f64, b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let b_view = ArrayView1::from(b);
    let b_norm = b_view.dot(&b_view).sqrt();
    if b_norm == 0.0 {
        return None;
    }
    let cos = a.dot(&b_view) / (a_norm * b_norm);
    cos.is_finite().then(|| cos.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> ChunkKey {
        ChunkKey::new(path, "h")
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]).unwrap() + 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_none());
    }

    #[test]
    fn scores_are_mapped_to_unit_range() {
        let mut index = VectorIndex::default();
        index.insert(key("same"), Arc::from(vec![1.0, 0.0]));
        index.insert(key("orthogonal"), Arc::from(vec![0.0, 1.0]));
        index.insert(key("opposite"), Arc::from(vec![-1.0, 0.0]));

        let scores = index.score_query(&[3.0, 0.0]);
        assert!((scores[&key("same")] - 1.0).abs() < 1e-12);
        assert!((scores[&key("orthogonal")] - 0.5).abs() < 1e-12);
        assert!(scores[&key("opposite")].abs() < 1e-12);
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let mut index = VectorIndex::default();
        index.insert(key("a"), Arc::from(vec![1.0, 0.0, 0.0]));
        assert!(index.score_query(&[1.0, 0.0]).is_empty());
    }

    #[test]
    fn zero_query_scores_nothing() {
        let mut index = VectorIndex::default();
        index.insert(key("a"), Arc::from(vec![1.0, 0.0]));
        assert!(index.score_query(&[0.0, 0.0]).is_empty());
    }

    #[test]
    fn remove_by_path_and_hash() {
        let mut index = VectorIndex::default();
        index.insert(key("a"), Arc::from(vec![1.0]));
        index.remove("a", "h");
        assert!(index.is_empty());
    }
}
