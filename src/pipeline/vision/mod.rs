//! Medicinal leaf identification: preprocessing, background removal,
//! classification and top-k prediction payloads.

pub mod background;
pub mod classifier;
pub mod labels;
pub mod predictor;
pub mod preprocess;

use std::path::PathBuf;

use thiserror::Error;

pub use background::{BackgroundRemover, NoOpBackgroundRemover};
pub use classifier::{LeafClassifier, MockLeafClassifier};
pub use predictor::{MedicinalLeafPredictor, Prediction, PredictionResult};
pub use preprocess::{InputNormalization, LeafPreprocessor, PreparedLeaf, PreprocessConfig};

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No plant detected after background removal")]
    NoSubjectDetected,

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization: {0}")]
    ModelInit(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Classifier produced {outputs} scores but {labels} labels are configured")]
    LabelMismatch { outputs: usize, labels: usize },

    #[error("Invalid labels file: {0}")]
    Labels(String),

    #[error("ONNX Runtime support is not compiled in (enable the `onnx` feature)")]
    RuntimeUnavailable,
}
