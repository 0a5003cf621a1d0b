//! Semindex vector crate - store queue, ingestion pipeline, search, and the
//! public index facade.
//!
//! Control flow is caller -> `VectorIndex` -> `StoreQueue` -> `RecordStore`.
//! Only the queue's worker thread touches the store.

pub mod embedding;
pub mod index;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod semantic;

pub use embedding::{DynEmbeddingService, EmbeddingService, HashingEmbedding};
#[cfg(feature = "onnx")]
pub use embedding::OnnxEmbeddingService;
pub use index::VectorIndex;
pub use pipeline::{IngestReport, IngestionPipeline, PreparedBatch};
pub use queue::StoreQueue;
pub use search::{cosine_similarity, SearchEngine};
pub use semantic::SemanticIndex;
