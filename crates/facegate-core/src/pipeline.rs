//! Probe pipeline: image bytes in, one normalized embedding out.
//!
//! Composes decode → locate → extract → normalize with the exactly-one-face
//! policy. Model loading happens once at construction and never fails the
//! process: an absent model is logged and surfaces as [`PipelineError::
//! ModelUnavailable`] on first use, so unrelated capabilities (such as a
//! status probe) keep working.

use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::locator::{FaceLocator, LocatorError};
use crate::types::{Embedding, FaceRegion};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The uploaded bytes do not decode as a raster image.
    #[error("invalid image format: {0}")]
    InvalidImageFormat(#[from] image::ImageError),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("multiple faces detected ({count}); upload an image with a single face")]
    MultipleFacesDetected { count: usize },
    /// A model failed to initialize at startup; reported lazily on use.
    #[error("face model unavailable")]
    ModelUnavailable,
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
}

/// Once-loaded locator + embedder pair.
pub struct FacePipeline {
    locator: Option<FaceLocator>,
    embedder: Option<FaceEmbedder>,
}

impl FacePipeline {
    /// Load both models, deferring failures.
    ///
    /// A model that fails to load leaves its slot empty; the failure is
    /// logged here and reported as [`PipelineError::ModelUnavailable`] when
    /// the pipeline is first exercised.
    pub fn load(locator_path: &str, embedder_path: &str) -> Self {
        let locator = match FaceLocator::load(locator_path) {
            Ok(l) => Some(l),
            Err(e) => {
                tracing::warn!(path = locator_path, error = %e, "face locator unavailable");
                None
            }
        };
        let embedder = match FaceEmbedder::load(embedder_path) {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(path = embedder_path, error = %e, "face embedder unavailable");
                None
            }
        };
        Self { locator, embedder }
    }

    /// Whether both models loaded.
    pub fn models_loaded(&self) -> bool {
        self.locator.is_some() && self.embedder.is_some()
    }

    /// Produce the probe embedding for one uploaded image.
    ///
    /// Decoding happens before any model access, so a malformed buffer is
    /// always reported as `InvalidImageFormat` — even when the models never
    /// initialized.
    pub fn probe(&mut self, image_bytes: &[u8]) -> Result<Embedding, PipelineError> {
        let image = image::load_from_memory(image_bytes)?.to_rgb8();

        let locator = self.locator.as_mut().ok_or(PipelineError::ModelUnavailable)?;
        let regions = locator.locate(&image)?;
        let region = single_region(regions)?;

        let embedder = self.embedder.as_mut().ok_or(PipelineError::ModelUnavailable)?;
        let raw = embedder.extract(&image, &region)?;

        Ok(raw.normalized())
    }
}

/// Enforce the exactly-one-face policy on the locator output.
fn single_region(regions: Vec<FaceRegion>) -> Result<FaceRegion, PipelineError> {
    match regions.len() {
        0 => Err(PipelineError::NoFaceDetected),
        1 => Ok(regions[0]),
        count => Err(PipelineError::MultipleFacesDetected { count }),
    }
}
