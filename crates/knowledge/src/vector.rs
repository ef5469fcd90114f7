//! Vector similarity utilities.

use careline_core::VectorHit;
use std::cmp::Ordering;

/// A stored document with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank stored vectors by cosine similarity to `query`.
///
/// Sorted by descending score, ties broken by id so results are stable
/// across calls. At most `limit` hits are returned.
pub fn rank_by_similarity(entries: &[StoredVector], query: &[f32], limit: usize) -> Vec<VectorHit> {
    let mut hits: Vec<VectorHit> = entries
        .iter()
        .map(|entry| VectorHit {
            id: entry.id.clone(),
            text: entry.text.clone(),
            score: cosine_similarity(&entry.embedding, query),
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}
