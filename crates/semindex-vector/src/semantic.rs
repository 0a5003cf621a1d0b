//! Text-in, text-out layer over [`VectorIndex`].
//!
//! `SemanticIndex` owns an embedding service: it embeds item texts and query
//! strings, then hands the vectors to the index. Embedding runs before the
//! store queue is involved, so it never holds up queued store operations.

use tracing::warn;

use semindex_core::error::{IndexError, Result};
use semindex_core::types::{NewsItem, SearchHit};

use crate::embedding::{DynEmbeddingService, EmbeddingService};
use crate::index::VectorIndex;
use crate::pipeline::IngestReport;

/// Vector index paired with the service that produces its embeddings.
///
/// Uses dynamic dispatch (`Box<dyn DynEmbeddingService>`) so that production
/// code can supply `OnnxEmbeddingService` while tests use `HashingEmbedding`.
pub struct SemanticIndex {
    index: VectorIndex,
    embedder: Box<dyn DynEmbeddingService>,
}

impl SemanticIndex {
    /// Pair `index` with `embedder`.
    ///
    /// A dimension mismatch is logged; every ingest would then store nothing.
    pub fn new(index: VectorIndex, embedder: impl EmbeddingService + 'static) -> Self {
        Self::new_dyn(index, Box::new(embedder))
    }

    /// Create from a pre-boxed dynamic embedding service.
    pub fn new_dyn(index: VectorIndex, embedder: Box<dyn DynEmbeddingService>) -> Self {
        if let Err(e) = check_dimensions(&index, embedder.as_ref()) {
            warn!(error = %e, "Embedder does not match index dimension");
        }
        Self { index, embedder }
    }

    /// Like [`new`](Self::new), but fails on a dimension mismatch.
    pub fn try_new(index: VectorIndex, embedder: impl EmbeddingService + 'static) -> Result<Self> {
        check_dimensions(&index, &embedder)?;
        Ok(Self {
            index,
            embedder: Box::new(embedder),
        })
    }

    /// The underlying index, for count and reset.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Sanitize, embed and ingest `items`.
    ///
    /// Only texts that survive sanitization are sent to the embedder.
    pub async fn try_ingest_items(&self, items: &[NewsItem]) -> Result<IngestReport> {
        let sanitizer = self.index.sanitizer();
        let mut positions = Vec::with_capacity(items.len());
        let mut texts = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let text = sanitizer.sanitize(&item.text);
            if !text.is_empty() {
                positions.push(i);
                texts.push(text);
            }
        }

        let mut embeddings = vec![Vec::new(); items.len()];
        if !texts.is_empty() {
            let vectors = self.embedder.embed_boxed(&texts).await?;
            for (slot, vector) in positions.into_iter().zip(vectors) {
                embeddings[slot] = vector;
            }
        }

        self.index.try_ingest(items, &embeddings).await
    }

    /// Ingest and return the number of records stored; 0 on any failure.
    pub async fn ingest_items(&self, items: &[NewsItem]) -> usize {
        match self.try_ingest_items(items).await {
            Ok(report) => report.stored,
            Err(e) => {
                warn!(error = %e, items = items.len(), "Semantic ingest failed");
                0
            }
        }
    }

    /// Embed `queries` and search the index.
    pub async fn try_search_text(
        &self,
        queries: &[String],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<SearchHit>> {
        let queries = &queries[..queries.len().min(self.index.max_queries())];
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embedder.embed_boxed(queries).await?;
        self.index.try_search(&vectors, top_k, min_score).await
    }

    /// Search by text; empty on any failure.
    pub async fn search_text(&self, queries: &[String], top_k: usize, min_score: f64) -> Vec<SearchHit> {
        match self.try_search_text(queries, top_k, min_score).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, queries = queries.len(), "Semantic search failed");
                Vec::new()
            }
        }
    }
}

fn check_dimensions(index: &VectorIndex, embedder: &dyn DynEmbeddingService) -> Result<()> {
    if embedder.dimensions() != index.dimension() {
        return Err(IndexError::DimensionMismatch {
            expected: index.dimension(),
            got: embedder.dimensions(),
        });
    }
    Ok(())
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("index", &self.index)
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Utc;

    use crate::embedding::HashingEmbedding;

    const DIM: usize = 64;

    fn semantic() -> SemanticIndex {
        SemanticIndex::new(VectorIndex::in_memory(100, DIM), HashingEmbedding::new(DIM))
    }

    struct FailingEmbedding;

    impl EmbeddingService for FailingEmbedding {
        fn embed(&self, _texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
            async { Err(IndexError::Embedding("model offline".to_string())) }
        }

        fn dimensions(&self) -> usize {
            DIM
        }
    }

    /// Hashing embedder that records how many texts it was asked to embed.
    struct CountingEmbedding {
        inner: HashingEmbedding,
        seen: Arc<AtomicUsize>,
    }

    impl EmbeddingService for CountingEmbedding {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.seen.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }

        fn dimensions(&self) -> usize {
            EmbeddingService::dimensions(&self.inner)
        }
    }

    #[tokio::test]
    async fn test_queries_past_limit_not_embedded() {
        let seen = Arc::new(AtomicUsize::new(0));
        let index = SemanticIndex::new(
            VectorIndex::in_memory(10, DIM),
            CountingEmbedding {
                inner: HashingEmbedding::new(DIM),
                seen: Arc::clone(&seen),
            },
        );

        let queries: Vec<String> = (0..8).map(|i| format!("query {}", i)).collect();
        index.try_search_text(&queries, 5, 0.0).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), index.index().max_queries());
        assert_eq!(index.index().max_queries(), 5);
    }

    #[test]
    fn test_try_new_rejects_dimension_mismatch() {
        let err = SemanticIndex::try_new(VectorIndex::in_memory(10, DIM), HashingEmbedding::new(DIM * 2))
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: DIM,
                got: 128
            }
        ));
        assert!(SemanticIndex::try_new(VectorIndex::in_memory(10, DIM), HashingEmbedding::new(DIM)).is_ok());
    }

    #[tokio::test]
    async fn test_mismatched_embedder_still_constructs() {
        let index = SemanticIndex::new(VectorIndex::in_memory(10, DIM), HashingEmbedding::new(DIM * 2));
        let items = [NewsItem::new("markets rally", Utc::now(), "a", "https://a/1")];
        assert_eq!(index.ingest_items(&items).await, 0);
    }

    #[tokio::test]
    async fn test_ingest_and_search_text() {
        let index = semantic();
        let stored = index
            .ingest_items(&[
                NewsItem::new("central bank raises interest rates", Utc::now(), "a", "https://a/1"),
                NewsItem::new("football club wins cup final", Utc::now(), "b", "https://b/1"),
            ])
            .await;
        assert_eq!(stored, 2);

        let hits = index
            .search_text(&["interest rates".to_string()], 5, 0.3)
            .await;
        assert_eq!(hits[0].text, "central bank raises interest rates");
    }

    #[tokio::test]
    async fn test_empty_texts_not_embedded() {
        let index = semantic();
        let report = index
            .try_ingest_items(&[
                NewsItem::new("\u{0000}  ", Utc::now(), "a", "https://a/1"),
                NewsItem::new("markets rally", Utc::now(), "a", "https://a/2"),
            ])
            .await
            .unwrap();

        assert_eq!(report.stored, 1);
        assert_eq!(report.dropped_empty, 1);
        assert_eq!(report.dropped_dimension, 0);
    }

    #[tokio::test]
    async fn test_unembeddable_text_dropped() {
        let index = semantic();
        let report = index
            .try_ingest_items(&[NewsItem::new("?!...", Utc::now(), "a", "https://a/1")])
            .await
            .unwrap();

        assert_eq!(report.stored, 0);
        assert_eq!(report.dropped_dimension, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let index = SemanticIndex::new(VectorIndex::in_memory(10, DIM), FailingEmbedding);

        let items = [NewsItem::new("anything", Utc::now(), "a", "https://a/1")];
        assert_eq!(index.ingest_items(&items).await, 0);
        assert!(index.search_text(&["anything".to_string()], 5, 0.0).await.is_empty());
        assert_eq!(index.index().count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_query_list() {
        let index = semantic();
        assert!(index.try_search_text(&[], 5, 0.0).await.unwrap().is_empty());
    }
}
