//! SCRFD face locator via ONNX Runtime.
//!
//! Runs a kps-free SCRFD export (3-stride anchor-free decoding, 6 output
//! tensors) over a decoded RGB image and returns face regions in original
//! pixel coordinates.

use crate::types::FaceRegion;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("model file not found: {0} — download the SCRFD export and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// A decoded candidate detection, in original image coordinates.
#[derive(Debug, Clone, Copy)]
struct Detection {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face locator.
///
/// Pure function of the input image given fixed model weights; `&mut self`
/// only because `Session::run` requires it.
pub struct FaceLocator {
    session: Session,
    input_height: usize,
    input_width: usize,
    /// Per-stride output indices [(score, bbox)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceLocator {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LocatorError> {
        if !Path::new(model_path).exists() {
            return Err(LocatorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 6 {
            return Err(LocatorError::InferenceFailed(format!(
                "SCRFD kps-free model requires 6 outputs (3 strides × score/bbox), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_height: DET_INPUT_SIZE,
            input_width: DET_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Locate faces in a decoded RGB image.
    ///
    /// Returns zero, one, or many regions in original pixel coordinates,
    /// sorted by descending confidence. The caller enforces the
    /// exactly-one-face policy.
    pub fn locate(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, LocatorError> {
        let (input, letterbox) = self.preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            let dets = decode_stride(
                scores,
                bboxes,
                stride,
                self.input_width,
                self.input_height,
                &letterbox,
                DET_SCORE_THRESHOLD,
            );
            all_detections.extend(dets);
        }

        let kept = nms(all_detections, DET_NMS_IOU);
        Ok(to_regions(kept, image.width(), image.height()))
    }

    /// Preprocess an RGB image into a NCHW float tensor with letterbox padding.
    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let width = image.width() as usize;
        let height = image.height() as usize;

        // Compute letterbox scale (fit within input_width × input_height)
        let scale_w = self.input_width as f32 / width as f32;
        let scale_h = self.input_height as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((width as f32 * scale).round() as u32).max(1);
        let new_h = ((height as f32 * scale).round() as u32).max(1);
        let pad_x = (self.input_width as f32 - new_w as f32) / 2.0;
        let pad_y = (self.input_height as f32 - new_h as f32) / 2.0;

        let letterbox = LetterboxInfo { scale, pad_x, pad_y };

        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        // Zero-initialized tensor: the letterbox border is already at the
        // normalized pad value.
        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_height, self.input_width));

        for y in 0..new_h as usize {
            for x in 0..new_w as usize {
                let pixel = resized.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    tensor[[0, c, y + pad_y_start, x + pad_x_start]] =
                        (pixel[c] as f32 - DET_MEAN) / DET_STD;
                }
            }
        }

        (tensor, letterbox)
    }
}

/// Discover output tensor ordering by name.
///
/// Kps-free SCRFD exports may name tensors "score_8"/"bbox_8" per stride,
/// or use generic numeric names. Falls back to the standard positional
/// ordering: [0-2] = scores (strides 8, 16, 32), [3-5] = bboxes.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named = DET_STRIDES
        .iter()
        .all(|&stride| find("score", stride).is_some() && find("bbox", stride).is_some());

    if named {
        tracing::info!("SCRFD: using name-based output tensor mapping");
        std::array::from_fn(|i| {
            let stride = DET_STRIDES[i];
            (find("score", stride).unwrap(), find("bbox", stride).unwrap())
        })
    } else {
        tracing::info!(
            ?names,
            "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes"
        );
        [(0, 3), (1, 4), (2, 5)]
    }
}

/// Decode detections for a single stride level into original image space.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_width: usize,
    input_height: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Detection> {
    let grid_h = input_height / stride;
    let grid_w = input_width / stride;
    let num_anchors = grid_h * grid_w * DET_ANCHORS_PER_CELL;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / DET_ANCHORS_PER_CELL;
        let cy = (anchor_idx / grid_w) as f32;
        let cx = (anchor_idx % grid_w) as f32;

        let anchor_cx = cx * stride as f32;
        let anchor_cy = cy * stride as f32;

        // Decode bbox: [x1_offset, y1_offset, x2_offset, y2_offset] * stride
        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[bbox_off] * stride as f32;
        let y1 = anchor_cy - bboxes[bbox_off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[bbox_off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[bbox_off + 3] * stride as f32;

        // Map from letterboxed space to original image space
        detections.push(Detection {
            x1: (x1 - letterbox.pad_x) / letterbox.scale,
            y1: (y1 - letterbox.pad_y) / letterbox.scale,
            x2: (x2 - letterbox.pad_x) / letterbox.scale,
            y2: (y2 - letterbox.pad_y) / letterbox.scale,
            score,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Compute Intersection-over-Union between two detections.
fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

/// Clamp surviving detections to image bounds and convert to regions.
///
/// Detections that collapse to an empty rectangle after clamping are
/// dropped. Output keeps the NMS ordering (descending confidence).
fn to_regions(detections: Vec<Detection>, width: u32, height: u32) -> Vec<FaceRegion> {
    detections
        .into_iter()
        .filter_map(|d| {
            let left = d.x1.max(0.0) as u32;
            let top = d.y1.max(0.0) as u32;
            let right = (d.x2.min(width as f32) as u32).min(width);
            let bottom = (d.y2.min(height as f32) as u32).min(height);
            if right <= left || bottom <= top {
                tracing::debug!(?d, "dropping degenerate detection after clamping");
                return None;
            }
            Some(FaceRegion {
                top,
                right,
                bottom,
                left,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Detection {
        Detection { x1, y1, x2, y2, score }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_det(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_det(20.0, 20.0, 30.0, 30.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_det(5.0, 0.0, 15.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        let expected = 50.0 / 150.0;
        assert!((iou(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_det(0.0, 0.0, 100.0, 100.0, 0.9),
            make_det(5.0, 5.0, 105.0, 105.0, 0.8),
            make_det(200.0, 200.0, 250.0, 250.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].score - 0.9).abs() < 1e-6);
        assert!((result[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_no_suppression() {
        let detections = vec![
            make_det(0.0, 0.0, 10.0, 10.0, 0.9),
            make_det(50.0, 50.0, 60.0, 60.0, 0.8),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_coordinate_roundtrip() {
        let width = 320.0f32;
        let height = 240.0f32;
        let scale = (640.0 / width).min(640.0 / height);
        let new_w = (width * scale).round();
        let new_h = (height * scale).round();
        let letterbox = LetterboxInfo {
            scale,
            pad_x: (640.0 - new_w) / 2.0,
            pad_y: (640.0 - new_h) / 2.0,
        };

        let orig_x = 100.0f32;
        let orig_y = 50.0f32;
        let boxed_x = orig_x * scale + letterbox.pad_x;
        let boxed_y = orig_y * scale + letterbox.pad_y;

        let recovered_x = (boxed_x - letterbox.pad_x) / letterbox.scale;
        let recovered_y = (boxed_y - letterbox.pad_y) / letterbox.scale;

        assert!((recovered_x - orig_x).abs() < 0.1, "x: {recovered_x} vs {orig_x}");
        assert!((recovered_y - orig_y).abs() < 0.1, "y: {recovered_y} vs {orig_y}");
    }

    #[test]
    fn test_decode_stride_respects_score_threshold() {
        // One anchor over threshold at stride 32, grid origin.
        let grid = (640 / 32) * (640 / 32) * DET_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; grid];
        scores[0] = 0.9;
        let bboxes = vec![1.0f32; grid * 4];
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let dets = decode_stride(&scores, &bboxes, 32, 640, 640, &letterbox, 0.5);
        assert_eq!(dets.len(), 1);
        // Anchor center (0,0), offsets all 1.0 * stride → box (-32,-32)..(32,32)
        assert!((dets[0].x1 + 32.0).abs() < 1e-4);
        assert!((dets[0].x2 - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["score_8", "score_16", "score_32", "bbox_8", "bbox_16", "bbox_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = ["bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(1, 0), (3, 2), (5, 4)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..6).map(|i: usize| i.to_string()).collect();
        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_to_regions_clamps_to_image_bounds() {
        let dets = vec![make_det(-10.0, -5.0, 50.0, 40.0, 0.9)];
        let regions = to_regions(dets, 48, 36);
        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0],
            FaceRegion { top: 0, right: 48, bottom: 36, left: 0 }
        );
    }

    #[test]
    fn test_to_regions_drops_degenerate_boxes() {
        // Entirely outside the image → collapses to an empty rect.
        let dets = vec![make_det(100.0, 100.0, 200.0, 200.0, 0.9)];
        assert!(to_regions(dets, 50, 50).is_empty());
    }
}
