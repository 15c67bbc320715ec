//! Leaf photo preprocessing for classifier input.
//!
//! Reproduces the dataset preparation the classifier was trained on:
//!
//! 1. Validate + decode to RGBA (EXIF orientation optional)
//! 2. Background removal
//! 3. Alpha-composite over opaque black, drop alpha
//! 4. Bounding box of all non-black pixels
//! 5. Crop to the box grown by `crop_padding`, clamped to the image
//! 6. Aspect-preserving bilinear resize, centered on a black square canvas
//! 7. Float32 NHWC tensor with batch dimension, classifier normalization
//!
//! Everything after background removal is pure and deterministic.

use std::io::Cursor;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::background::BackgroundRemover;
use super::VisionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum upload size accepted before decoding.
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Classifier input side (EfficientNet-B0).
pub const DEFAULT_TARGET_SIZE: u32 = 224;

/// Pixels added around the detected leaf before cropping.
pub const DEFAULT_CROP_PADDING: u32 = 10;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Input scaling the classifier expects after the pixel tensor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputNormalization {
    /// Keras EfficientNet: the model rescales internally, raw `[0, 255]` floats go in.
    EfficientNet,
    /// `x / 255` (browser TF.js deployments).
    UnitRange,
    /// `(x / 255 - mean) / std` with ImageNet statistics.
    ImageNet,
}

impl FromStr for InputNormalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "efficientnet" | "efficient_net" | "none" => Ok(Self::EfficientNet),
            "unit_range" | "unit" | "rescale" => Ok(Self::UnitRange),
            "imagenet" | "image_net" | "torch" => Ok(Self::ImageNet),
            other => Err(format!(
                "unknown normalization '{other}' (expected efficientnet, unit_range or imagenet)"
            )),
        }
    }
}

impl InputNormalization {
    /// Normalize an NHWC tensor in place.
    pub fn apply(self, tensor: &mut Array4<f32>) {
        match self {
            Self::EfficientNet => {}
            Self::UnitRange => tensor.mapv_inplace(|v| v / 255.0),
            Self::ImageNet => {
                for ((_, _, _, c), v) in tensor.indexed_iter_mut() {
                    *v = (*v / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                }
            }
        }
    }
}

/// Geometry and normalization of the classifier input.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Side of the square canvas fed to the classifier.
    pub target_size: u32,
    /// Padding around the detected subject before cropping.
    pub crop_padding: u32,
    /// Composite/canvas color. Pixels of exactly this color count as background.
    pub background: [u8; 3],
    pub normalization: InputNormalization,
    /// Rotate according to the EXIF orientation tag after decoding.
    /// Off by default: the classifier was trained on unrotated pixels.
    pub apply_exif_orientation: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            crop_padding: DEFAULT_CROP_PADDING,
            background: [0, 0, 0],
            normalization: InputNormalization::EfficientNet,
            apply_exif_orientation: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Result types
// ═══════════════════════════════════════════════════════════

/// Crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Inclusive bounds of the non-background pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectBounds {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

/// A preprocessed leaf, ready for the classifier.
#[derive(Debug)]
pub struct PreparedLeaf {
    /// `[1, target, target, 3]` float32 tensor.
    pub tensor: Array4<f32>,
    pub original_width: u32,
    pub original_height: u32,
    pub crop: CropBox,
    /// Size of the resized leaf inside the padded canvas.
    pub content_width: u32,
    pub content_height: u32,
}

// ═══════════════════════════════════════════════════════════
// LeafPreprocessor
// ═══════════════════════════════════════════════════════════

pub struct LeafPreprocessor {
    remover: Box<dyn BackgroundRemover>,
    config: PreprocessConfig,
}

impl LeafPreprocessor {
    pub fn new(remover: Box<dyn BackgroundRemover>, config: PreprocessConfig) -> Self {
        Self { remover, config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Run the full pipeline on encoded image bytes.
    pub fn prepare(&self, image_bytes: &[u8]) -> Result<PreparedLeaf, VisionError> {
        // 1. Validate + decode
        validate_image_bytes(image_bytes)?;
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| VisionError::InvalidImage(format!("Failed to decode image: {e}")))?;
        let img = if self.config.apply_exif_orientation {
            apply_orientation(img, read_exif_orientation(image_bytes))
        } else {
            img
        };
        let (orig_w, orig_h) = img.dimensions();
        let rgba = img.to_rgba8();

        // 2. Background removal
        let cutout = self.remover.remove(&rgba)?;

        // 3. Flatten onto the background color
        let merged = composite_over_background(&cutout, self.config.background);

        // 4. Locate the subject
        let bounds = subject_bounds(&merged, self.config.background)
            .ok_or(VisionError::NoSubjectDetected)?;

        // 5. Padded crop
        let crop = padded_crop_box(
            bounds,
            merged.width(),
            merged.height(),
            self.config.crop_padding,
        );
        let cropped =
            image::imageops::crop_imm(&merged, crop.x, crop.y, crop.width, crop.height).to_image();

        // 6. Resize + pad
        let (canvas, content_w, content_h) =
            resize_with_padding(&cropped, self.config.target_size, self.config.background);

        // 7. Tensor
        let tensor = to_input_tensor(&canvas, self.config.normalization);

        debug!(
            original = format!("{orig_w}x{orig_h}"),
            crop = format!("{}x{}+{}+{}", crop.width, crop.height, crop.x, crop.y),
            content = format!("{content_w}x{content_h}"),
            "Leaf image preprocessed"
        );

        Ok(PreparedLeaf {
            tensor,
            original_width: orig_w,
            original_height: orig_h,
            crop,
            content_width: content_w,
            content_height: content_h,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Steps
// ═══════════════════════════════════════════════════════════

/// Reject empty or oversized payloads before handing them to a decoder.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), VisionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(VisionError::InvalidImage(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(VisionError::InvalidImage(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Alpha-composite an RGBA image over an opaque solid color and drop alpha.
pub fn composite_over_background(image: &RgbaImage, background: [u8; 3]) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, px) in image.enumerate_pixels() {
        let a = px[3] as u32;
        let mut rgb = [0u8; 3];
        for (c, slot) in rgb.iter_mut().enumerate() {
            let fg = px[c] as u32 * a;
            let bg = background[c] as u32 * (255 - a);
            *slot = ((fg + bg + 127) / 255) as u8;
        }
        out.put_pixel(x, y, Rgb(rgb));
    }
    out
}

/// Inclusive bounding box of every pixel that differs from `background`.
pub fn subject_bounds(image: &RgbImage, background: [u8; 3]) -> Option<SubjectBounds> {
    let mut bounds: Option<SubjectBounds> = None;

    for (x, y, px) in image.enumerate_pixels() {
        if px.0 == background {
            continue;
        }
        bounds = Some(match bounds {
            None => SubjectBounds {
                x_min: x,
                y_min: y,
                x_max: x,
                y_max: y,
            },
            Some(b) => SubjectBounds {
                x_min: b.x_min.min(x),
                y_min: b.y_min.min(y),
                x_max: b.x_max.max(x),
                y_max: b.y_max.max(y),
            },
        });
    }

    bounds
}

/// Grow `bounds` by `pad` on every side and clamp to the image.
///
/// The right/bottom edges are exclusive: `min(width, x_max + pad)`.
pub fn padded_crop_box(bounds: SubjectBounds, width: u32, height: u32, pad: u32) -> CropBox {
    let left = bounds.x_min.saturating_sub(pad);
    let top = bounds.y_min.saturating_sub(pad);
    let right = (bounds.x_max + pad).min(width);
    let bottom = (bounds.y_max + pad).min(height);

    CropBox {
        x: left,
        y: top,
        width: right.saturating_sub(left).max(1),
        height: bottom.saturating_sub(top).max(1),
    }
}

/// Dimensions that fit inside a `target_size` square while preserving aspect ratio.
///
/// `scale = min(t/w, t/h)` in f64, each edge truncated, so the longest edge
/// can land one pixel short of `target_size`. Small crops are upscaled.
pub fn compute_fit_dimensions(width: u32, height: u32, target_size: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }

    let t = target_size as f64;
    let scale = (t / width as f64).min(t / height as f64);
    let new_w = (width as f64 * scale) as u32;
    let new_h = (height as f64 * scale) as u32;

    (new_w.clamp(1, target_size), new_h.clamp(1, target_size))
}

/// Bilinear resize into a centered, `background`-filled square canvas.
///
/// Returns the canvas and the content dimensions.
pub fn resize_with_padding(
    image: &RgbImage,
    target_size: u32,
    background: [u8; 3],
) -> (RgbImage, u32, u32) {
    let (content_w, content_h) = compute_fit_dimensions(image.width(), image.height(), target_size);
    let resized = image::imageops::resize(image, content_w, content_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb(background));
    let offset_x = (target_size - content_w) / 2;
    let offset_y = (target_size - content_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x, offset_y);

    (canvas, content_w, content_h)
}

/// Convert an RGB image to a `[1, H, W, 3]` float tensor and normalize it.
pub fn to_input_tensor(image: &RgbImage, normalization: InputNormalization) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, h as usize, w as usize, 3));

    for (x, y, px) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = px[c] as f32;
        }
    }

    normalization.apply(&mut tensor);
    tensor
}
