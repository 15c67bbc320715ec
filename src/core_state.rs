//! Application state shared by the HTTP server and the command-line tools.
//!
//! Components load independently: a missing classifier leaves the remedy
//! assistant usable and vice versa. Handlers report an unloaded component
//! as 503.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::pipeline::rag::{RagError, RemedyEngine};
use crate::pipeline::vision::background::load_background_remover;
use crate::pipeline::vision::classifier::load_classifier;
use crate::pipeline::vision::labels::load_labels;
use crate::pipeline::vision::{
    LeafPreprocessor, MedicinalLeafPredictor, PreprocessConfig, VisionError,
};

pub struct CoreState {
    pub config: AppConfig,
    predictor: Option<Arc<MedicinalLeafPredictor>>,
    remedy: Option<Arc<RemedyEngine>>,
}

impl CoreState {
    /// State with explicit components (tests, embedding in other binaries).
    pub fn new(
        config: AppConfig,
        predictor: Option<Arc<MedicinalLeafPredictor>>,
        remedy: Option<Arc<RemedyEngine>>,
    ) -> Self {
        Self {
            config,
            predictor,
            remedy,
        }
    }

    /// Load every component the configuration points at. Failures are
    /// logged and leave that component unloaded.
    ///
    /// Blocking: loads ONNX models, opens SQLite and builds a blocking HTTP client.
    pub fn load(config: AppConfig) -> Self {
        let predictor = match load_predictor(&config) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    model = %config.classifier_model.display(),
                    "Leaf classifier not loaded; /api/identify will return 503"
                );
                None
            }
        };

        let remedy = match RemedyEngine::from_config(&config) {
            Ok(engine) => Some(Arc::new(engine)),
            Err(e) => {
                tracing::warn!(error = %e, "Remedy assistant not loaded; /api/remedy will return 503");
                None
            }
        };

        Self::new(config, predictor, remedy)
    }

    pub fn predictor(&self) -> Option<Arc<MedicinalLeafPredictor>> {
        self.predictor.clone()
    }

    pub fn remedy(&self) -> Option<Arc<RemedyEngine>> {
        self.remedy.clone()
    }

    pub fn classifier_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn remedy_loaded(&self) -> bool {
        self.remedy.is_some()
    }
}

/// Build the leaf predictor: background remover, classifier and labels.
pub fn load_predictor(config: &AppConfig) -> Result<MedicinalLeafPredictor, VisionError> {
    let classifier = load_classifier(&config.classifier_model)?;
    let remover = load_background_remover(&config.background_model)?;
    let labels = load_labels(config.labels_path.as_deref())?;

    let preprocessor = LeafPreprocessor::new(
        remover,
        PreprocessConfig {
            normalization: config.input_normalization,
            apply_exif_orientation: config.exif_orientation,
            ..PreprocessConfig::default()
        },
    );
    MedicinalLeafPredictor::new(preprocessor, classifier, labels)
}

/// Build only the remedy engine (remedy console).
pub fn load_remedy(config: &AppConfig) -> Result<RemedyEngine, RagError> {
    RemedyEngine::from_config(config)
}
