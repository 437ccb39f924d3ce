//! FaceNet embedding extractor via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from a cropped face region.
//! Preprocessing replicates the model's calibration exactly: resize the
//! crop to 160×160, then standardize against the crop's own mean and
//! standard deviation (std clamped below at 1/sqrt(element count)).

use crate::types::{Embedding, FaceRegion};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACENET_INPUT_SIZE: usize = 160;
const FACENET_EMBEDDING_DIM: usize = 512;
const FACENET_MODEL_VERSION: &str = "facenet-512";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — download the FaceNet export and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region {0}x{1} has no overlap with the image")]
    EmptyCrop(u32, u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FaceNet-based embedding extractor.
///
/// Stateless after load; `&mut self` only because `Session::run` requires it.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Extract a raw (unnormalized) embedding for one face region.
    ///
    /// The caller normalizes afterwards; keeping extraction and
    /// normalization separate means the stored-vector scale is decided in
    /// exactly one place, the pipeline.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        region: &FaceRegion,
    ) -> Result<Embedding, EmbedderError> {
        let crop = crop_region(image, region)?;
        let input = preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != FACENET_EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {FACENET_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: raw,
            model_version: Some(FACENET_MODEL_VERSION.to_string()),
        })
    }
}

/// Cut the face region out of the image, clamped to image bounds.
fn crop_region(image: &RgbImage, region: &FaceRegion) -> Result<RgbImage, EmbedderError> {
    let left = region.left.min(image.width());
    let top = region.top.min(image.height());
    let right = region.right.min(image.width());
    let bottom = region.bottom.min(image.height());

    let width = right.saturating_sub(left);
    let height = bottom.saturating_sub(top);
    if width == 0 || height == 0 {
        return Err(EmbedderError::EmptyCrop(region.width(), region.height()));
    }

    Ok(image::imageops::crop_imm(image, left, top, width, height).to_image())
}

/// Resize the crop to the model's input resolution and standardize it
/// against its own statistics, producing a NCHW float tensor.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = FACENET_INPUT_SIZE;
    let resized = image::imageops::resize(
        crop,
        size as u32,
        size as u32,
        FilterType::Triangle,
    );

    let n = (size * size * 3) as f32;
    let mut sum = 0.0f32;
    for pixel in resized.pixels() {
        for c in 0..3 {
            sum += pixel[c] as f32;
        }
    }
    let mean = sum / n;

    let mut var_sum = 0.0f32;
    for pixel in resized.pixels() {
        for c in 0..3 {
            let d = pixel[c] as f32 - mean;
            var_sum += d * d;
        }
    }
    // Clamp std to a numerically safe minimum, exactly as the model was
    // calibrated: max(std, 1/sqrt(n)).
    let std = (var_sum / n).sqrt().max(1.0 / n.sqrt());

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let pixel = resized.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (pixel[c] as f32 - mean) / std;
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_image(w: u32, h: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb([value; 3]))
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = uniform_image(80, 80, 128);
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_uniform_crop_standardizes_to_zero() {
        // Zero variance → std clamps to 1/sqrt(n) and every value is (v - v) / std = 0.
        let crop = uniform_image(FACENET_INPUT_SIZE as u32, FACENET_INPUT_SIZE as u32, 77);
        let tensor = preprocess(&crop);
        assert!(tensor.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_preprocess_statistics() {
        // Half dark, half bright: standardized output has mean ~0 and std ~1.
        let size = FACENET_INPUT_SIZE as u32;
        let mut crop = uniform_image(size, size, 30);
        for y in 0..size {
            for x in 0..size / 2 {
                crop.put_pixel(x, y, image::Rgb([220; 3]));
            }
        }
        let tensor = preprocess(&crop);

        let n = tensor.len() as f32;
        let mean: f32 = tensor.iter().sum::<f32>() / n;
        let var: f32 = tensor.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;

        assert!(mean.abs() < 1e-3, "mean = {mean}");
        assert!((var.sqrt() - 1.0).abs() < 1e-3, "std = {}", var.sqrt());
    }

    #[test]
    fn test_crop_region_respects_bounds() {
        let img = uniform_image(100, 60, 10);
        let region = FaceRegion { top: 10, right: 150, bottom: 80, left: 40 };
        let crop = crop_region(&img, &region).unwrap();
        assert_eq!(crop.width(), 60);
        assert_eq!(crop.height(), 50);
    }

    #[test]
    fn test_crop_region_outside_image_is_an_error() {
        let img = uniform_image(50, 50, 10);
        let region = FaceRegion { top: 60, right: 90, bottom: 80, left: 70 };
        assert!(matches!(
            crop_region(&img, &region),
            Err(EmbedderError::EmptyCrop(..))
        ));
    }
}
