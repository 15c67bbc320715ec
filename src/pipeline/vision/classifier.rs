//! Leaf classifier: maps a preprocessed `[1, 224, 224, 3]` tensor to one score
//! per class.

use ndarray::Array4;

use super::VisionError;

/// Tolerance for treating classifier output as an already-normalized
/// probability distribution.
const PROBABILITY_SUM_TOLERANCE: f32 = 1e-3;

/// Produces per-class scores for a single preprocessed leaf.
pub trait LeafClassifier: Send + Sync {
    /// Scores for batch element 0. Returned scores are probabilities.
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, VisionError>;

    /// Number of classes the model emits, when known ahead of inference.
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

/// Returns fixed scores regardless of input. Used in tests and when wiring
/// the server without a model.
pub struct MockLeafClassifier {
    scores: Vec<f32>,
}

impl MockLeafClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    /// One-hot scores with the given class winning.
    pub fn one_hot(num_classes: usize, winner: usize) -> Self {
        let mut scores = vec![0.0; num_classes];
        if let Some(s) = scores.get_mut(winner) {
            *s = 1.0;
        }
        Self { scores }
    }
}

impl LeafClassifier for MockLeafClassifier {
    fn predict(&self, _input: &Array4<f32>) -> Result<Vec<f32>, VisionError> {
        Ok(self.scores.clone())
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.scores.len())
    }
}

/// Convert raw model output to probabilities.
///
/// Output that is already a distribution (non-negative, summing to ~1) is
/// returned unchanged. Anything else is treated as logits and softmaxed.
pub fn ensure_probabilities(scores: Vec<f32>) -> Result<Vec<f32>, VisionError> {
    if scores.is_empty() {
        return Err(VisionError::Inference("Classifier returned no scores".into()));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(VisionError::Inference(
            "Classifier returned non-finite scores".into(),
        ));
    }

    let sum: f32 = scores.iter().sum();
    if scores.iter().all(|&s| s >= 0.0) && (sum - 1.0).abs() <= PROBABILITY_SUM_TOLERANCE {
        return Ok(scores);
    }

    Ok(softmax(&scores))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

// ═══════════════════════════════════════════════════════════
// ONNX classifier (`onnx` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx")]
mod onnx {
    use super::{ensure_probabilities, LeafClassifier};
    use crate::pipeline::vision::VisionError;
    use ndarray::Array4;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// EfficientNet-B0 leaf classifier exported to ONNX (NHWC input).
    pub struct OnnxLeafClassifier {
        session: Mutex<Session>,
    }

    impl OnnxLeafClassifier {
        pub fn load(model_path: &Path) -> Result<Self, VisionError> {
            if !model_path.exists() {
                return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| VisionError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| VisionError::ModelInit(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e: ort::Error| VisionError::ModelInit(format!("ONNX load failed: {e}")))?;

            tracing::info!(path = %model_path.display(), "Leaf classifier loaded");

            Ok(Self {
                session: Mutex::new(session),
            })
        }
    }

    impl LeafClassifier for OnnxLeafClassifier {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, VisionError> {
            use ort::value::TensorRef;

            let tensor = TensorRef::from_array_view(input)
                .map_err(|e| VisionError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| VisionError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| VisionError::Inference(format!("Classifier inference failed: {e}")))?;

            // [1, num_classes]
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Inference(format!("Output extraction: {e}")))?;

            let num_classes = shape.last().copied().unwrap_or(0).max(0) as usize;
            if num_classes == 0 || data.len() < num_classes {
                return Err(VisionError::Inference(format!(
                    "Unexpected classifier output shape {shape:?}"
                )));
            }

            ensure_probabilities(data[..num_classes].to_vec())
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxLeafClassifier;

/// Load the ONNX leaf classifier from `model_path`.
pub fn load_classifier(
    model_path: &std::path::Path,
) -> Result<Box<dyn LeafClassifier>, VisionError> {
    #[cfg(feature = "onnx")]
    {
        Ok(Box::new(OnnxLeafClassifier::load(model_path)?))
    }
    #[cfg(not(feature = "onnx"))]
    {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
        }
        Err(VisionError::RuntimeUnavailable)
    }
}
