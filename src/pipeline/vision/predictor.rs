//! End-to-end leaf identification: bytes in, top-k prediction payload out.

use serde::Serialize;

use super::classifier::LeafClassifier;
use super::preprocess::LeafPreprocessor;
use super::VisionError;

/// Predictions returned per request.
pub const DEFAULT_TOP_K: usize = 5;

/// One ranked class. `label`/`score` mirror `class`/`confidence` for the
/// frontend, which reads either pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub rank: usize,
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub probability: String,
    pub label: String,
    pub score: f32,
}

impl Prediction {
    fn new(rank: usize, class_name: &str, confidence: f32) -> Self {
        Self {
            rank,
            class_name: class_name.to_string(),
            confidence,
            probability: format_probability(confidence),
            label: class_name.to_string(),
            score: confidence,
        }
    }
}

/// Body of `POST /api/identify`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResult {
    Success {
        success: bool,
        predicted_class: String,
        confidence: f32,
        predictions: Vec<Prediction>,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl PredictionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            success: false,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// `0.873` → `"87.3%"`
pub fn format_probability(p: f32) -> String {
    format!("{:.1}%", p * 100.0)
}

/// Indices of the `k` highest scores, descending. Ties keep the lower index first.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.truncate(k);
    indices
}

/// Preprocessor + classifier + class names.
pub struct MedicinalLeafPredictor {
    preprocessor: LeafPreprocessor,
    classifier: Box<dyn LeafClassifier>,
    class_names: Vec<String>,
}

impl MedicinalLeafPredictor {
    pub fn new(
        preprocessor: LeafPreprocessor,
        classifier: Box<dyn LeafClassifier>,
        class_names: Vec<String>,
    ) -> Result<Self, VisionError> {
        if let Some(outputs) = classifier.num_classes() {
            if outputs != class_names.len() {
                return Err(VisionError::LabelMismatch {
                    outputs,
                    labels: class_names.len(),
                });
            }
        }
        tracing::info!(classes = class_names.len(), "Leaf predictor ready");
        Ok(Self {
            preprocessor,
            classifier,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Run the full pipeline. Failures become a `success: false` payload.
    pub fn predict_leaf(&self, image_bytes: &[u8], top_k: usize) -> PredictionResult {
        match self.classify(image_bytes, top_k) {
            Ok(predictions) => {
                let Some(best) = predictions.first() else {
                    return PredictionResult::failure("Classifier returned no predictions");
                };
                PredictionResult::Success {
                    success: true,
                    predicted_class: best.class_name.clone(),
                    confidence: best.confidence,
                    predictions,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Leaf identification failed");
                PredictionResult::failure(e.to_string())
            }
        }
    }

    /// Ranked predictions, or the first pipeline error.
    pub fn classify(&self, image_bytes: &[u8], top_k: usize) -> Result<Vec<Prediction>, VisionError> {
        let prepared = self.preprocessor.prepare(image_bytes)?;
        let scores = self.classifier.predict(&prepared.tensor)?;
        let scores = super::classifier::ensure_probabilities(scores)?;

        if scores.len() != self.class_names.len() {
            return Err(VisionError::LabelMismatch {
                outputs: scores.len(),
                labels: self.class_names.len(),
            });
        }

        let predictions: Vec<Prediction> = top_k_indices(&scores, top_k.max(1))
            .into_iter()
            .enumerate()
            .map(|(i, idx)| Prediction::new(i + 1, &self.class_names[idx], scores[idx]))
            .collect();

        if let Some(best) = predictions.first() {
            tracing::debug!(top = %best.class_name, confidence = best.confidence, "Leaf classified");
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::vision::{
        labels::default_labels, MockLeafClassifier, NoOpBackgroundRemover, PreprocessConfig,
    };
    use image::{ImageOutputFormat, Rgba, RgbaImage};

    fn leaf_png() -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(120, 80, Rgba([0, 0, 0, 0]));
        for y in 20..60 {
            for x in 30..90 {
                img.put_pixel(x, y, Rgba([40, 160, 60, 255]));
            }
        }
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn predictor(classifier: MockLeafClassifier) -> MedicinalLeafPredictor {
        let preprocessor =
            LeafPreprocessor::new(Box::new(NoOpBackgroundRemover), PreprocessConfig::default());
        MedicinalLeafPredictor::new(preprocessor, Box::new(classifier), default_labels()).unwrap()
    }

    #[test]
    fn probability_string_has_one_decimal() {
        assert_eq!(format_probability(0.873), "87.3%");
        assert_eq!(format_probability(1.0), "100.0%");
        assert_eq!(format_probability(0.0), "0.0%");
    }

    #[test]
    fn top_k_orders_descending_with_stable_ties() {
        let scores = [0.1, 0.4, 0.4, 0.05, 0.05];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 2, 0]);
        assert_eq!(top_k_indices(&scores, 10).len(), 5);
    }

    #[test]
    fn predicts_top_five_for_leaf() {
        let mut scores = vec![0.0f32; 80];
        scores[74] = 0.6; // Tulsi
        scores[49] = 0.2; // Neem
        scores[0] = 0.1;
        scores[1] = 0.06;
        scores[2] = 0.04;
        let result = predictor(MockLeafClassifier::new(scores)).predict_leaf(&leaf_png(), 5);

        let PredictionResult::Success {
            success,
            predicted_class,
            confidence,
            predictions,
        } = result
        else {
            panic!("expected a success payload");
        };
        assert!(success);
        assert_eq!(predicted_class, "Tulsi");
        assert!((confidence - 0.6).abs() < 1e-6);
        assert_eq!(predictions.len(), 5);
        assert_eq!(predictions[1].class_name, "Neem");
        assert_eq!(predictions[1].rank, 2);
        assert_eq!(predictions[0].probability, "60.0%");
        assert_eq!(predictions[0].label, "Tulsi");
    }

    #[test]
    fn success_payload_serializes_frontend_fields() {
        let result = predictor(MockLeafClassifier::one_hot(80, 49)).predict_leaf(&leaf_png(), 5);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["predicted_class"], "Neem");
        assert_eq!(json["predictions"][0]["class"], "Neem");
        assert_eq!(json["predictions"][0]["label"], "Neem");
        assert_eq!(json["predictions"][0]["probability"], "100.0%");
        assert_eq!(json["predictions"][0]["rank"], 1);
        assert!(json["predictions"][0].get("class_name").is_none());
    }

    #[test]
    fn transparent_image_yields_failure_payload() {
        let img = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 0]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();

        let result = predictor(MockLeafClassifier::one_hot(80, 0)).predict_leaf(&buf, 5);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No plant detected after background removal");
    }

    #[test]
    fn logits_are_normalized_before_ranking() {
        let mut logits = vec![-5.0f32; 80];
        logits[10] = 3.0;
        let preds = predictor(MockLeafClassifier::new(logits))
            .classify(&leaf_png(), 5)
            .unwrap();
        assert_eq!(preds[0].class_name, "Bhrami");
        assert!(preds[0].confidence > 0.9 && preds[0].confidence <= 1.0);
    }

    #[test]
    fn label_count_mismatch_rejected_at_construction() {
        let preprocessor =
            LeafPreprocessor::new(Box::new(NoOpBackgroundRemover), PreprocessConfig::default());
        let err = MedicinalLeafPredictor::new(
            preprocessor,
            Box::new(MockLeafClassifier::one_hot(3, 0)),
            default_labels(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            VisionError::LabelMismatch {
                outputs: 3,
                labels: 80
            }
        ));
    }
}
