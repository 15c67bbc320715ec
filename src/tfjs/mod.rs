//! TensorFlow.js model tooling: Keras → TF.js conversion and repair of
//! `model.json` InputLayer metadata the browser loader rejects.

pub mod convert;
pub mod model_json;

use std::path::PathBuf;

use thiserror::Error;

pub use convert::{convert_h5_to_tfjs, ConversionMethod, ConvertOptions, ConvertReport};
pub use model_json::{fix_input_layer, fix_topology, FixKind, FixOutcome, InputLayerFix};

#[derive(Error, Debug)]
pub enum TfjsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid model.json: {0}")]
    InvalidModelJson(String),

    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Converter not found: {0}. Install with: pip install tensorflowjs")]
    ConverterNotFound(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("model.json not found after conversion: {0}")]
    ModelJsonMissing(PathBuf),
}
