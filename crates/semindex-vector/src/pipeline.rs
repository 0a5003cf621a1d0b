//! Ingestion pipeline.
//!
//! Turns raw news items plus their precomputed embeddings into records ready
//! for the store. Preparation is pure and runs outside the store queue:
//!
//! 1. Sanitize text; drop items that come out empty
//! 2. Drop items whose embedding is missing or has the wrong length
//! 3. Compute the deterministic identity
//! 4. Collapse repeated identities within the batch (last one wins)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use semindex_core::identity::record_id;
use semindex_core::sanitize::Sanitizer;
use semindex_core::types::{NewsItem, VectorRecord};

/// Structured outcome of one ingestion call.
///
/// Only `stored` is exposed by [`VectorIndex::ingest`](crate::VectorIndex::ingest);
/// the remaining counters make drop behavior observable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Items handed in.
    pub requested: usize,
    /// Distinct records written.
    pub stored: usize,
    /// Items whose sanitized text was empty.
    pub dropped_empty: usize,
    /// Items with a missing or wrong-length embedding.
    pub dropped_dimension: usize,
    /// Earlier occurrences of an identity repeated later in the same batch.
    pub merged_duplicates: usize,
    /// Older records removed to stay within capacity.
    pub evicted: usize,
}

impl IngestReport {
    /// Items that survived validation, before duplicate merging.
    pub fn accepted(&self) -> usize {
        self.requested - self.dropped_empty - self.dropped_dimension
    }
}

/// Records that survived validation, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub records: Vec<VectorRecord>,
    pub report: IngestReport,
}

impl PreparedBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set the insertion time on every record.
    pub fn stamp(&mut self, ingested_at: DateTime<Utc>) {
        for record in &mut self.records {
            record.ingested_at = ingested_at;
        }
    }
}

/// Validation and identity stage of ingestion.
#[derive(Debug, Clone, Copy)]
pub struct IngestionPipeline {
    sanitizer: Sanitizer,
    dimension: usize,
}

impl IngestionPipeline {
    pub fn new(sanitizer: Sanitizer, dimension: usize) -> Self {
        Self {
            sanitizer,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Pair `items` with `embeddings` by position and build records.
    ///
    /// Embeddings past the end of `items` are ignored. Items past the end of
    /// `embeddings` count as dimension drops.
    pub fn prepare(&self, items: &[NewsItem], embeddings: &[Vec<f32>]) -> PreparedBatch {
        let mut report = IngestReport {
            requested: items.len(),
            ..IngestReport::default()
        };
        let mut records: Vec<VectorRecord> = Vec::with_capacity(items.len());
        let mut slots: HashMap<String, usize> = HashMap::new();
        let now = Utc::now();

        for (i, item) in items.iter().enumerate() {
            let text = self.sanitizer.sanitize(&item.text);
            if text.is_empty() {
                report.dropped_empty += 1;
                continue;
            }

            let embedding = match embeddings.get(i) {
                Some(e) if e.len() == self.dimension => e.clone(),
                other => {
                    debug!(
                        index = i,
                        got = other.map(Vec::len),
                        expected = self.dimension,
                        "Dropping item with unusable embedding"
                    );
                    report.dropped_dimension += 1;
                    continue;
                }
            };

            let id = record_id(&item.source, &item.url, item.published_at, &text);
            let record = VectorRecord {
                id: id.clone(),
                text,
                embedding,
                published_at: item.published_at,
                ingested_at: now,
                source: item.source.clone(),
                url: item.url.clone(),
                tags: item.tags.clone(),
            };

            match slots.get(&id) {
                Some(&slot) => {
                    records[slot] = record;
                    report.merged_duplicates += 1;
                }
                None => {
                    slots.insert(id, records.len());
                    records.push(record);
                }
            }
        }

        PreparedBatch { records, report }
    }
}
