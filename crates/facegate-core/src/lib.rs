//! facegate-core — Face location and embedding extraction engine.
//!
//! Uses a kps-free SCRFD export for face location and a FaceNet-512 model
//! for embedding extraction, both running via ONNX Runtime for CPU
//! inference. The [`pipeline`] module composes them into the single-probe
//! pipeline: decode → locate exactly one face → extract → normalize.

pub mod embedder;
pub mod locator;
pub mod matching;
pub mod pipeline;
pub mod types;

pub use matching::{EuclideanMatcher, MatchError, Matcher};
pub use pipeline::{FacePipeline, PipelineError};
pub use types::{Embedding, FaceRegion, Identity};
