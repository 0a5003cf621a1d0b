//! Multi-query brute-force ranking.
//!
//! Every stored record is scored against every usable query; a record's score
//! is its best similarity across the queries, so a record matching several
//! queries appears once. Candidates at or above `min_score` are ranked by
//! score with a stable sort, which keeps store order among equal scores.

use semindex_core::config::SearchConfig;
use semindex_core::types::{SearchHit, VectorRecord};

/// Largest `top_k` a caller may request by default.
pub const MAX_TOP_K: usize = 20;

/// Queries considered per search by default; extras are ignored.
pub const MAX_QUERIES: usize = 5;

/// Cosine similarity between two vectors, accumulated in `f64`.
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut mag_a = 0.0f64;
    let mut mag_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a.sqrt() * mag_b.sqrt())
}

/// Ranking parameters and the clamping rules applied to caller input.
#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    dimension: usize,
    max_queries: usize,
    max_top_k: usize,
}

impl SearchEngine {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_queries: MAX_QUERIES,
            max_top_k: MAX_TOP_K,
        }
    }

    pub fn from_config(dimension: usize, config: &SearchConfig) -> Self {
        Self {
            dimension,
            max_queries: config.max_queries.max(1),
            max_top_k: config.max_top_k.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Queries considered per search.
    pub fn max_queries(&self) -> usize {
        self.max_queries
    }

    /// Clamp `top_k` into `[1, max_top_k]`.
    pub fn clamp_top_k(&self, top_k: usize) -> usize {
        top_k.clamp(1, self.max_top_k)
    }

    /// Clamp `min_score` into `[0, 1]`; NaN becomes 0.
    pub fn clamp_min_score(min_score: f64) -> f64 {
        if min_score.is_nan() {
            0.0
        } else {
            min_score.clamp(0.0, 1.0)
        }
    }

    /// The first `max_queries` queries, minus those of the wrong length.
    pub fn usable_queries<'a>(&self, queries: &'a [Vec<f32>]) -> Vec<&'a [f32]> {
        queries
            .iter()
            .take(self.max_queries)
            .filter(|q| q.len() == self.dimension)
            .map(Vec::as_slice)
            .collect()
    }

    /// Score, filter and rank `records` against `queries`.
    ///
    /// `records` must be in store order.
    pub fn rank(
        &self,
        records: Vec<VectorRecord>,
        queries: &[Vec<f32>],
        top_k: usize,
        min_score: f64,
    ) -> Vec<SearchHit> {
        let queries = self.usable_queries(queries);
        if queries.is_empty() {
            return Vec::new();
        }
        let top_k = self.clamp_top_k(top_k);
        let min_score = Self::clamp_min_score(min_score);

        let mut scored: Vec<(f64, VectorRecord)> = records
            .into_iter()
            .filter_map(|record| {
                let best = queries
                    .iter()
                    .map(|q| cosine_similarity(q, &record.embedding))
                    .fold(f64::NEG_INFINITY, f64::max);
                (best >= min_score).then_some((best, record))
            })
            .collect();

        // Stable: equal scores keep store order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, record)| SearchHit {
                text: record.text,
                published_at: record.published_at,
                source: record.source,
                score,
            })
            .collect()
    }
}
