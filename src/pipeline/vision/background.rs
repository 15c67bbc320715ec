//! Background removal for leaf photos.
//!
//! The production remover runs a U²-Net salient-object model through ONNX
//! Runtime (feature `onnx`). The mask math lives outside the feature gate so
//! it stays testable without a model file.

use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbaImage};
use ndarray::Array4;

use super::VisionError;

/// U²-Net input side.
pub const U2NET_INPUT_SIZE: u32 = 320;

const U2NET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const U2NET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Removes the background of an RGBA image, returning a cutout whose alpha
/// channel is zero where background was detected.
pub trait BackgroundRemover: Send + Sync {
    fn remove(&self, image: &RgbaImage) -> Result<RgbaImage, VisionError>;
}

/// Returns the image unchanged. Use for inputs that are already cut out
/// (transparent PNGs) and in tests.
pub struct NoOpBackgroundRemover;

impl BackgroundRemover for NoOpBackgroundRemover {
    fn remove(&self, image: &RgbaImage) -> Result<RgbaImage, VisionError> {
        Ok(image.clone())
    }
}

/// Build the `[1, 3, 320, 320]` U²-Net input: Lanczos resize, scale by the
/// brightest channel value, then ImageNet mean/std per channel.
pub fn u2net_input(image: &RgbaImage) -> Array4<f32> {
    let side = U2NET_INPUT_SIZE;
    let resized = image::imageops::resize(image, side, side, FilterType::Lanczos3);

    let max_value = resized
        .pixels()
        .flat_map(|p| p.0[..3].iter().copied())
        .max()
        .unwrap_or(0) as f32;
    let max_value = max_value.max(1e-6);

    let mut input = Array4::<f32>::zeros((1, 3, side as usize, side as usize));
    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            let v = px[c] as f32 / max_value;
            input[[0, c, y as usize, x as usize]] = (v - U2NET_MEAN[c]) / U2NET_STD[c];
        }
    }
    input
}

/// Turn a raw `side x side` saliency map into a mask sized like the source.
///
/// The prediction is min-max normalized to `[0, 255]` before resizing.
pub fn mask_from_prediction(
    prediction: &[f32],
    side: u32,
    width: u32,
    height: u32,
) -> Result<GrayImage, VisionError> {
    let expected = (side * side) as usize;
    if prediction.len() < expected {
        return Err(VisionError::Inference(format!(
            "Saliency map has {} values, expected {expected}",
            prediction.len()
        )));
    }
    let prediction = &prediction[..expected];

    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = (max - min).max(f32::EPSILON);

    let mask = GrayImage::from_fn(side, side, |x, y| {
        let v = (prediction[(y * side + x) as usize] - min) / range;
        Luma([(v * 255.0).clamp(0.0, 255.0) as u8])
    });

    if (width, height) == (side, side) {
        return Ok(mask);
    }

    Ok(image::imageops::resize(
        &mask,
        width,
        height,
        FilterType::Lanczos3,
    ))
}

/// Blend the image toward transparent black by the mask.
///
/// All four channels are scaled by `m / 255`, so soft mask edges darken as
/// well as fade.
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> Result<RgbaImage, VisionError> {
    if image.dimensions() != mask.dimensions() {
        return Err(VisionError::Inference(format!(
            "Mask is {:?}, image is {:?}",
            mask.dimensions(),
            image.dimensions()
        )));
    }

    let mut out = image.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let m = mask.get_pixel(x, y)[0] as u32;
        for c in px.0.iter_mut() {
            *c = ((*c as u32 * m + 127) / 255) as u8;
        }
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════
// ONNX U²-Net remover (`onnx` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx")]
mod onnx {
    use super::{apply_mask, mask_from_prediction, u2net_input, BackgroundRemover, U2NET_INPUT_SIZE};
    use crate::pipeline::vision::VisionError;
    use image::RgbaImage;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// U²-Net salient object segmentation (`u2net.onnx`, as shipped by rembg).
    ///
    /// `ort::Session::run` needs `&mut self`, hence the Mutex.
    pub struct U2NetBackgroundRemover {
        session: Mutex<Session>,
    }

    impl U2NetBackgroundRemover {
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

            tracing::info!(path = %model_path.display(), "Background removal model loaded");

            Ok(Self {
                session: Mutex::new(session),
            })
        }
    }

    impl BackgroundRemover for U2NetBackgroundRemover {
        fn remove(&self, image: &RgbaImage) -> Result<RgbaImage, VisionError> {
            use ort::value::TensorRef;

            let input = u2net_input(image);
            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| VisionError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| VisionError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| VisionError::Inference(format!("U2Net inference failed: {e}")))?;

            // First output: [1, 1, 320, 320] fused saliency map
            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Inference(format!("Output extraction: {e}")))?;

            let mask = mask_from_prediction(data, U2NET_INPUT_SIZE, image.width(), image.height())?;
            apply_mask(image, &mask)
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::U2NetBackgroundRemover;

/// Load the U²-Net remover from `model_path`.
pub fn load_background_remover(
    model_path: &std::path::Path,
) -> Result<Box<dyn BackgroundRemover>, VisionError> {
    #[cfg(feature = "onnx")]
    {
        Ok(Box::new(U2NetBackgroundRemover::load(model_path)?))
    }
    #[cfg(not(feature = "onnx"))]
    {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
        }
        Err(VisionError::RuntimeUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn noop_returns_identical_image() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4]));
        assert_eq!(NoOpBackgroundRemover.remove(&img).unwrap(), img);
    }

    #[test]
    fn u2net_input_has_nchw_shape() {
        let img = RgbaImage::from_pixel(64, 48, Rgba([200, 100, 50, 255]));
        let input = u2net_input(&img);
        assert_eq!(input.shape(), &[1, 3, 320, 320]);
    }

    #[test]
    fn u2net_input_scales_by_brightest_channel() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 0, 255]));
        let input = u2net_input(&img);
        // Red channel is the maximum: (1.0 - mean) / std
        let expected = (1.0 - 0.485) / 0.229;
        assert!((input[[0, 0, 160, 160]] - expected).abs() < 0.05);
    }

    #[test]
    fn mask_is_min_max_normalized() {
        let side = 4;
        let mut pred = vec![0.2f32; 16];
        pred[5] = 0.9;
        let mask = mask_from_prediction(&pred, side, side, side).unwrap();
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn mask_is_resized_to_source_dimensions() {
        let pred = vec![0.5f32; 16];
        let mask = mask_from_prediction(&pred, 4, 10, 7).unwrap();
        assert_eq!(mask.dimensions(), (10, 7));
    }

    #[test]
    fn short_prediction_is_an_error() {
        assert!(mask_from_prediction(&[0.0; 3], 4, 4, 4).is_err());
    }

    #[test]
    fn apply_mask_scales_alpha() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([0]));
        mask.put_pixel(1, 0, Luma([255]));

        let out = apply_mask(&img, &mask).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(1, 0)[3], 255);
        assert_eq!(out.get_pixel(1, 0)[0], 10);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn half_mask_darkens_edge_pixels_before_compositing() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 255]));
        let mask = GrayImage::from_pixel(1, 1, Luma([128]));

        let out = apply_mask(&img, &mask).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [100, 50, 25, 128]);

        let merged = crate::pipeline::vision::preprocess::composite_over_background(&out, [0, 0, 0]);
        assert_eq!(merged.get_pixel(0, 0).0, [50, 25, 13]);
    }

    #[test]
    fn apply_mask_rejects_size_mismatch() {
        let img = RgbaImage::new(2, 2);
        let mask = GrayImage::new(3, 2);
        assert!(apply_mask(&img, &mask).is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn missing_model_reported_before_runtime() {
        let err = load_background_remover(std::path::Path::new("/nonexistent/u2net.onnx"))
            .err()
            .unwrap();
        assert!(matches!(err, VisionError::ModelNotFound(_)));
    }
}
