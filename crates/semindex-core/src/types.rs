use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Ingestion input
// =============================================================================

/// A raw item handed to the index for ingestion.
///
/// `text` is sanitized before identity hashing; the remaining fields pass
/// through to the stored record unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl NewsItem {
    pub fn new(
        text: impl Into<String>,
        published_at: DateTime<Utc>,
        source: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            published_at,
            source: source.into(),
            url: url.into(),
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

// =============================================================================
// Persisted record
// =============================================================================

/// The only persisted entity.
///
/// Invariant: `embedding.len()` equals the store's configured dimension.
/// Records are never patched field by field; a write under an existing `id`
/// replaces the whole record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Hex SHA-256 of `(source, url, published_at, text)`.
    pub id: String,
    /// Sanitized text that was embedded.
    pub text: String,
    pub embedding: Vec<f32>,
    /// Source-provided recency; metadata only.
    pub published_at: DateTime<Utc>,
    /// Wall-clock insertion time; eviction order key.
    pub ingested_at: DateTime<Utc>,
    pub source: String,
    pub url: String,
    /// `None` and `Some(vec![])` are kept distinct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// =============================================================================
// Search output
// =============================================================================

/// A ranked search result. Embedding, id and ingestion time stay internal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    /// Best cosine similarity across all queries.
    pub score: f64,
}

// =============================================================================
// Timestamp helpers
// =============================================================================

/// Milliseconds since the Unix epoch, the precision timestamps are persisted at.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_millis`]. Returns `None` for out-of-range values.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}
