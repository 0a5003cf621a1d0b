//! The public vector index.
//!
//! `VectorIndex` wires the ingestion pipeline and the search engine onto a
//! single [`StoreQueue`]. Every operation is enqueued when it is called, so
//! calls on one index complete in call order.
//!
//! Two surfaces are offered:
//!
//! - `try_ingest` / `try_search` / `try_count` / `try_reset` return `Result`.
//! - `ingest` / `search` / `count` / `reset` never fail: errors are logged and
//!   the zero value is returned. With no backing medium every call is a no-op.

use std::future::Future;

use chrono::Utc;
use tracing::{debug, debug_span, info, warn};

use semindex_core::config::{IndexConfig, StorageConfig, StorageMedium};
use semindex_core::error::{IndexError, Result};
use semindex_core::sanitize::Sanitizer;
use semindex_core::types::{NewsItem, SearchHit};
use semindex_storage::RecordStore;

use crate::pipeline::{IngestReport, IngestionPipeline};
use crate::queue::StoreQueue;
use crate::search::SearchEngine;

/// Capacity-bounded persistent index of text embeddings.
///
/// Cloning is cheap; clones share the same store and queue.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    /// `None` in degraded mode.
    queue: Option<StoreQueue>,
    pipeline: IngestionPipeline,
    engine: SearchEngine,
    capacity: usize,
    default_top_k: usize,
    default_min_score: f64,
}

impl VectorIndex {
    /// Build an index from configuration.
    ///
    /// Never fails: an invalid configuration, a disabled medium, or a worker
    /// that cannot be spawned all yield a degraded index.
    pub fn open(config: &IndexConfig) -> Self {
        let dimension = config.embedding.dimension;
        let pipeline =
            IngestionPipeline::new(Sanitizer::new(config.ingest.max_text_chars), dimension);
        let engine = SearchEngine::from_config(dimension, &config.search);

        let queue = match config.validate() {
            Ok(()) => start_queue(&config.storage, dimension),
            Err(e) => {
                warn!(error = %e, "Invalid index configuration; running degraded");
                None
            }
        };

        Self {
            queue,
            pipeline,
            engine,
            capacity: config.storage.capacity,
            default_top_k: config.search.default_top_k,
            default_min_score: config.search.default_min_score,
        }
    }

    /// Index on a private in-memory database.
    pub fn in_memory(capacity: usize, dimension: usize) -> Self {
        Self::with_storage(StorageConfig::memory(capacity), dimension)
    }

    /// Index with default ingest and search settings on the given storage.
    pub fn with_storage(storage: StorageConfig, dimension: usize) -> Self {
        let mut config = IndexConfig::default();
        config.storage = storage;
        config.embedding.dimension = dimension;
        Self::open(&config)
    }

    /// True when no backing medium is available and every call is a no-op.
    pub fn is_degraded(&self) -> bool {
        self.queue.is_none()
    }

    pub fn dimension(&self) -> usize {
        self.pipeline.dimension()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queries considered per search; later ones are ignored.
    pub fn max_queries(&self) -> usize {
        self.engine.max_queries()
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        self.pipeline.sanitizer()
    }

    // -------------------------------------------------------------------------
    // Fallible surface
    // -------------------------------------------------------------------------

    /// Validate, deduplicate and commit `items`, paired by position with
    /// `embeddings`. Eviction runs in the same transaction.
    pub fn try_ingest(
        &self,
        items: &[NewsItem],
        embeddings: &[Vec<f32>],
    ) -> impl Future<Output = Result<IngestReport>> + Send + 'static {
        let _span = debug_span!("ingest", items = items.len()).entered();
        let mut batch = self.pipeline.prepare(items, embeddings);

        let pending = self.queue.as_ref().map(|queue| {
            queue.submit("ingest", move |store| {
                batch.stamp(Utc::now());
                let (written, evicted) = store.commit_batch(&batch.records)?;
                let mut report = batch.report;
                report.stored = written;
                report.evicted = evicted;
                debug!(
                    stored = report.stored,
                    dropped_empty = report.dropped_empty,
                    dropped_dimension = report.dropped_dimension,
                    evicted = report.evicted,
                    "Ingested batch"
                );
                Ok(report)
            })
        });

        unavailable_or(pending)
    }

    /// Rank every stored record against `queries`.
    pub fn try_search(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
        min_score: f64,
    ) -> impl Future<Output = Result<Vec<SearchHit>>> + Send + 'static {
        let _span = debug_span!("search", queries = queries.len(), top_k).entered();
        let engine = self.engine;
        let queries = queries.to_vec();

        let pending = self.queue.as_ref().map(|queue| {
            queue.submit("search", move |store| {
                let records = store.get_all()?;
                let scanned = records.len();
                let hits = engine.rank(records, &queries, top_k, min_score);
                debug!(scanned, hits = hits.len(), "Search complete");
                Ok(hits)
            })
        });

        unavailable_or(pending)
    }

    /// Number of stored records.
    pub fn try_count(&self) -> impl Future<Output = Result<usize>> + Send + 'static {
        let pending = self
            .queue
            .as_ref()
            .map(|queue| queue.submit("count", |store| store.count()));

        unavailable_or(pending)
    }

    /// Delete every record, then close the handle so the next call reopens it.
    pub fn try_reset(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.queue.as_ref().map(|queue| {
            queue.submit("reset", |store| {
                let deleted = store.clear()?;
                store.close();
                info!(deleted, "Vector index reset");
                Ok(())
            })
        });

        unavailable_or(pending)
    }

    // -------------------------------------------------------------------------
    // Infallible surface
    // -------------------------------------------------------------------------

    /// Ingest and return the number of records stored. Never fails.
    pub fn ingest(
        &self,
        items: &[NewsItem],
        embeddings: &[Vec<f32>],
    ) -> impl Future<Output = usize> + Send + 'static {
        let pending = self.try_ingest(items, embeddings);
        async move { settle("ingest", pending.await).stored }
    }

    /// Search and return ranked hits. Never fails.
    pub fn search(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
        min_score: f64,
    ) -> impl Future<Output = Vec<SearchHit>> + Send + 'static {
        let pending = self.try_search(queries, top_k, min_score);
        async move { settle("search", pending.await) }
    }

    /// Search with the configured default `top_k` and `min_score`.
    pub fn search_default(
        &self,
        queries: &[Vec<f32>],
    ) -> impl Future<Output = Vec<SearchHit>> + Send + 'static {
        self.search(queries, self.default_top_k, self.default_min_score)
    }

    /// Number of stored records; 0 on failure.
    pub fn count(&self) -> impl Future<Output = usize> + Send + 'static {
        let pending = self.try_count();
        async move { settle("count", pending.await) }
    }

    /// Clear the index. Failures are logged.
    pub fn reset(&self) -> impl Future<Output = ()> + Send + 'static {
        let pending = self.try_reset();
        async move { settle("reset", pending.await) }
    }
}

fn start_queue(storage: &StorageConfig, dimension: usize) -> Option<StoreQueue> {
    if storage.medium == StorageMedium::Disabled {
        info!("Vector storage disabled; running degraded");
        return None;
    }

    match StoreQueue::new(RecordStore::new(storage.clone(), dimension)) {
        Ok(queue) => Some(queue),
        Err(e) => {
            warn!(error = %e, "Failed to start store worker; running degraded");
            None
        }
    }
}

/// Await a queued operation, or fail with `Unavailable` when nothing was queued.
async fn unavailable_or<T>(pending: Option<impl Future<Output = Result<T>>>) -> Result<T> {
    match pending {
        Some(pending) => pending.await,
        None => Err(IndexError::Unavailable),
    }
}

/// Collapse a result to its value or the zero value.
fn settle<T: Default>(op: &'static str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(IndexError::Unavailable) => {
            debug!(op, "Vector storage unavailable; returning empty result");
            T::default()
        }
        Err(e) => {
            warn!(op, error = %e, "Vector index operation failed; returning empty result");
            T::default()
        }
    }
}
