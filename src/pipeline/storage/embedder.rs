//! Sentence embeddings for knowledge base passages and symptom queries.

use std::path::Path;

use super::types::EmbeddingModel;
use super::StorageError;

/// Embedding dimension of all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Token limit of all-MiniLM-L6-v2 as trained; longer passages are truncated.
pub const MAX_SEQ_LEN: usize = 256;

/// Mean of token vectors weighted by the attention mask, one row per
/// sequence. `hidden` is `[batch, seq_len, dim]`, `mask` is `[batch, seq_len]`.
pub fn mean_pool(hidden: &[f32], mask: &[i64], seq_len: usize, dim: usize) -> Vec<Vec<f32>> {
    mask.chunks(seq_len.max(1))
        .enumerate()
        .map(|(row, row_mask)| {
            let mut pooled = vec![0.0f32; dim];
            let mut weight = 0.0f32;
            for (token, &m) in row_mask.iter().enumerate() {
                if m == 0 {
                    continue;
                }
                weight += 1.0;
                let start = (row * seq_len + token) * dim;
                for (p, h) in pooled.iter_mut().zip(&hidden[start..start + dim]) {
                    *p += h;
                }
            }
            if weight > 0.0 {
                pooled.iter_mut().for_each(|p| *p /= weight);
            }
            pooled
        })
        .collect()
}

/// Scale to unit length in place; zero vectors stay zero.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX Embedder (`onnx` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx")]
mod onnx {
    use super::{l2_normalize, mean_pool, EmbeddingModel, StorageError, EMBEDDING_DIM, MAX_SEQ_LEN};
    use ndarray::Array2;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;
    use tokenizers::{Tokenizer, TruncationParams};

    /// sentence-transformers/all-MiniLM-L6-v2 exported to ONNX.
    ///
    /// The model directory holds `model.onnx` and `tokenizer.json`.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, StorageError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            for path in [&model_path, &tokenizer_path] {
                if !path.exists() {
                    return Err(StorageError::ModelNotFound(path.clone()));
                }
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| StorageError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| StorageError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| StorageError::ModelInit(format!("ONNX load failed: {e}")))?;

            let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| StorageError::ModelInit(format!("Tokenizer load failed: {e}")))?;
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length: MAX_SEQ_LEN,
                    ..TruncationParams::default()
                }))
                .map_err(|e| StorageError::ModelInit(format!("Tokenizer truncation: {e}")))?;

            tracing::info!(dir = %model_dir.display(), "Sentence embedder loaded");

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
            })
        }

        /// One padded forward pass over the whole batch.
        fn infer_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            use ort::value::TensorRef;

            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let encodings = self
                .tokenizer
                .encode_batch(texts.to_vec(), true)
                .map_err(|e| StorageError::Tokenization(e.to_string()))?;

            let batch = encodings.len();
            let seq_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0)
                .max(1);

            let mut ids = Array2::<i64>::zeros((batch, seq_len));
            let mut mask = Array2::<i64>::zeros((batch, seq_len));
            let mut types = Array2::<i64>::zeros((batch, seq_len));
            for (row, encoding) in encodings.iter().enumerate() {
                let tokens = encoding
                    .get_ids()
                    .iter()
                    .zip(encoding.get_attention_mask())
                    .zip(encoding.get_type_ids());
                for (col, ((&id, &m), &t)) in tokens.enumerate() {
                    ids[[row, col]] = i64::from(id);
                    mask[[row, col]] = i64::from(m);
                    types[[row, col]] = i64::from(t);
                }
            }

            let ids_tensor = TensorRef::from_array_view(&ids)
                .map_err(|e| StorageError::Embedding(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask)
                .map_err(|e| StorageError::Embedding(e.to_string()))?;
            let type_tensor = TensorRef::from_array_view(&types)
                .map_err(|e| StorageError::Embedding(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| StorageError::Embedding("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
                .map_err(|e| StorageError::Embedding(format!("ONNX inference failed: {e}")))?;

            // last_hidden_state: [batch, seq_len, 384]
            let (shape, hidden) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| StorageError::Embedding(format!("Output extraction: {e}")))?;

            let expected = [batch as i64, seq_len as i64, EMBEDDING_DIM as i64];
            if shape.len() != 3 || shape[..] != expected[..] {
                return Err(StorageError::Embedding(format!(
                    "Unexpected output shape {shape:?}, expected {expected:?}"
                )));
            }

            let mask_flat: Vec<i64> = mask.iter().copied().collect();
            let mut pooled = mean_pool(hidden, &mask_flat, seq_len, EMBEDDING_DIM);
            pooled.iter_mut().for_each(|v| l2_normalize(v));
            Ok(pooled)
        }
    }

    impl EmbeddingModel for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
            self.infer_batch(&[text])?
                .pop()
                .ok_or_else(|| StorageError::Embedding("Empty embedding batch".into()))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            self.infer_batch(texts)
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;

/// Load the sentence embedder from `model_dir`.
pub fn load_embedder(model_dir: &Path) -> Result<Box<dyn EmbeddingModel>, StorageError> {
    #[cfg(feature = "onnx")]
    {
        Ok(Box::new(OnnxEmbedder::load(model_dir)?))
    }
    #[cfg(not(feature = "onnx"))]
    {
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(StorageError::ModelNotFound(model_path));
        }
        Err(StorageError::RuntimeUnavailable)
    }
}

/// Bag-of-words embedder for tests and offline tooling.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension`
/// buckets, so texts sharing words have positive cosine similarity.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dimension];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty());
        for word in words {
            buckets[(fnv1a(&word.to_lowercase()) % self.dimension as u64) as usize] += 1.0;
        }
        l2_normalize(&mut buckets);
        buckets
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        Ok(self.hashed(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        Ok(texts.iter().map(|t| self.hashed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
