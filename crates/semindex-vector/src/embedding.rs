//! Embedding service trait and implementations.
//!
//! - `HashingEmbedding` is a deterministic bag-of-words embedder: texts that
//!   share words get similar vectors. Used by tests and benchmarks.
//! - `OnnxEmbeddingService` (feature `onnx`) runs a sentence-transformer
//!   ONNX model in batches.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use semindex_core::error::Result;

/// Service that turns texts into fixed-dimension vectors.
///
/// The output is order-preserving: `result[i]` belongs to `texts[i]`. An
/// implementation may return a shorter list or wrong-length vectors for
/// texts it cannot embed; ingestion drops those items.
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts.
    fn embed(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Dimensionality of produced vectors.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Embed a batch of texts (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>>;

    /// Dimensionality of produced vectors.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(self.embed(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// HashingEmbedding - feature-hashed bag of words
// ---------------------------------------------------------------------------

/// Deterministic embedder that hashes lowercased word tokens into buckets.
///
/// Each token adds 1.0 to bucket `hash(token) % dimensions`; the result is
/// L2-normalized. A text without any alphanumeric token yields an empty
/// vector, i.e. it is reported as unembeddable.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimensions: usize,
}

impl HashingEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
            tokens += 1;
        }

        if tokens == 0 {
            return Vec::new();
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        for val in &mut vector {
            *val /= norm;
        }
        vector
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - real ONNX Runtime inference
// ---------------------------------------------------------------------------

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbeddingService;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use ort::session::Session;
    use ort::value::TensorRef;
    use tokenizers::Tokenizer;
    use tracing::info;

    use semindex_core::config::EmbeddingConfig;
    use semindex_core::error::{IndexError, Result};

    use super::EmbeddingService;

    /// ONNX Runtime-backed sentence-transformer embedder.
    ///
    /// Expects a model directory containing `model.onnx` and `tokenizer.json`.
    /// A batch is padded to its longest sequence, run in one session call,
    /// mean-pooled under the attention mask and L2-normalized.
    pub struct OnnxEmbeddingService {
        session: Arc<Mutex<Session>>,
        tokenizer: Arc<Tokenizer>,
        dimensions: usize,
    }

    impl std::fmt::Debug for OnnxEmbeddingService {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxEmbeddingService")
                .field("dimensions", &self.dimensions)
                .finish()
        }
    }

    fn embed_err(context: &str) -> impl Fn(String) -> IndexError + '_ {
        move |e| IndexError::Embedding(format!("{}: {}", context, e))
    }

    impl OnnxEmbeddingService {
        /// Load the configured model from [`EmbeddingConfig::resolved_model_dir`].
        pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
            let dir = config.resolved_model_dir();
            info!(model = %config.model, dir = %dir.display(), "Loading embedding model");
            Self::from_directory(&dir, config.dimension)
        }

        /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
        pub fn from_directory(model_dir: &Path, dimensions: usize) -> Result<Self> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");
            for path in [&model_path, &tokenizer_path] {
                if !path.exists() {
                    return Err(IndexError::Embedding(format!(
                        "Model file not found at {}",
                        path.display()
                    )));
                }
            }

            let session = Session::builder()
                .map_err(|e| embed_err("ONNX session builder")(e.to_string()))?
                .with_intra_threads(1)
                .map_err(|e| embed_err("ONNX set threads")(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e| embed_err("ONNX load model")(e.to_string()))?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| embed_err("Load tokenizer")(e.to_string()))?;

            info!(model = %model_path.display(), dimensions, "Loaded ONNX embedding model");

            Ok(Self {
                session: Arc::new(Mutex::new(session)),
                tokenizer: Arc::new(tokenizer),
                dimensions,
            })
        }

        fn embed_batch_sync(
            session: &Mutex<Session>,
            tokenizer: &Tokenizer,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let encodings = tokenizer
                .encode_batch(texts, true)
                .map_err(|e| embed_err("Tokenization failed")(e.to_string()))?;

            let batch = encodings.len();
            let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
            if seq_len == 0 {
                return Ok(vec![Vec::new(); batch]);
            }

            let mut ids = vec![0i64; batch * seq_len];
            let mut mask = vec![0i64; batch * seq_len];
            let mut types = vec![0i64; batch * seq_len];
            for (row, enc) in encodings.iter().enumerate() {
                let base = row * seq_len;
                for (col, ((&id, &m), &t)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .zip(enc.get_type_ids())
                    .enumerate()
                {
                    ids[base + col] = id as i64;
                    mask[base + col] = m as i64;
                    types[base + col] = t as i64;
                }
            }

            let shape = (batch, seq_len);
            let ids_array = ndarray::Array2::from_shape_vec(shape, ids)
                .map_err(|e| embed_err("input_ids array")(e.to_string()))?;
            let mask_array = ndarray::Array2::from_shape_vec(shape, mask.clone())
                .map_err(|e| embed_err("attention_mask array")(e.to_string()))?;
            let type_array = ndarray::Array2::from_shape_vec(shape, types)
                .map_err(|e| embed_err("token_type_ids array")(e.to_string()))?;

            let ids_ref = TensorRef::from_array_view(&ids_array)
                .map_err(|e| embed_err("TensorRef input_ids")(e.to_string()))?;
            let mask_ref = TensorRef::from_array_view(&mask_array)
                .map_err(|e| embed_err("TensorRef attention_mask")(e.to_string()))?;
            let type_ref = TensorRef::from_array_view(&type_array)
                .map_err(|e| embed_err("TensorRef token_type_ids")(e.to_string()))?;

            let mut session = session
                .lock()
                .map_err(|e| embed_err("Session lock poisoned")(e.to_string()))?;
            let outputs = session
                .run(ort::inputs![ids_ref, mask_ref, type_ref])
                .map_err(|e| embed_err("ONNX inference failed")(e.to_string()))?;

            // [batch, seq_len, hidden]
            let (out_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| embed_err("Extract embeddings")(e.to_string()))?;
            let hidden = match out_shape.iter().copied().collect::<Vec<i64>>().as_slice() {
                [_, _, h] if *h > 0 => *h as usize,
                other => {
                    return Err(IndexError::Embedding(format!(
                        "Unexpected output shape: {:?}",
                        other
                    )))
                }
            };

            let mut result = Vec::with_capacity(batch);
            for row in 0..batch {
                let mut pooled = vec![0.0f32; hidden];
                let mut count = 0.0f32;
                for tok in 0..seq_len {
                    if mask[row * seq_len + tok] > 0 {
                        let offset = (row * seq_len + tok) * hidden;
                        for (dim, value) in pooled.iter_mut().enumerate() {
                            *value += data[offset + dim];
                        }
                        count += 1.0;
                    }
                }
                if count > 0.0 {
                    pooled.iter_mut().for_each(|v| *v /= count);
                }
                let norm: f32 = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    pooled.iter_mut().for_each(|v| *v /= norm);
                }
                result.push(pooled);
            }

            Ok(result)
        }
    }

    impl EmbeddingService for OnnxEmbeddingService {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            // Inference is CPU-bound; run on a blocking thread.
            let session = Arc::clone(&self.session);
            let tokenizer = Arc::clone(&self.tokenizer);
            let texts = texts.to_vec();

            tokio::task::spawn_blocking(move || {
                Self::embed_batch_sync(&session, &tokenizer, texts)
            })
            .await
            .map_err(|e| IndexError::Embedding(format!("Embedding task panicked: {}", e)))?
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_onnx_missing_model() {
            let result = OnnxEmbeddingService::from_directory(Path::new("/nonexistent"), 384);
            assert!(result.is_err());
        }

        #[test]
        fn test_onnx_from_config_uses_model_dir() {
            let dir = tempfile::tempdir().unwrap();
            let config = EmbeddingConfig {
                model_dir: Some(dir.path().to_string_lossy().to_string()),
                ..EmbeddingConfig::default()
            };
            let err = OnnxEmbeddingService::from_config(&config).unwrap_err();
            assert!(err.to_string().contains(&dir.path().display().to_string()));
        }
    }
}
