//! Single-face detector via ONNX Runtime.
//!
//! Runs a lightweight face-detection model over a letterboxed RGB frame
//! and returns the highest-confidence face above the score threshold.
//! The app is single-face by contract, so no suppression of secondary
//! candidates is needed.

use crate::types::FaceBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DETECTOR_DEFAULT_INPUT_SIZE: usize = 416;
const DETECTOR_DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const DETECTOR_MEAN: f32 = 127.5;
const DETECTOR_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detector-owned tuning knobs, separate from application config.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    /// Square model input side in pixels.
    pub input_size: usize,
    /// Minimum confidence for a candidate to count as a face.
    pub score_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            input_size: DETECTOR_DEFAULT_INPUT_SIZE,
            score_threshold: DETECTOR_DEFAULT_SCORE_THRESHOLD,
        }
    }
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// ONNX-backed face detector.
pub struct FaceDetector {
    session: Session,
    options: DetectorOptions,
    /// Output tensor positions for (scores, boxes), discovered by name
    /// at load time with a positional fallback.
    scores_idx: usize,
    boxes_idx: usize,
}

impl FaceDetector {
    /// Load the detection ONNX model from the given path.
    pub fn load(model_path: &Path, options: DetectorOptions) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detection model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let (scores_idx, boxes_idx) = discover_output_indices(&output_names);

        Ok(Self {
            session,
            options,
            scores_idx,
            boxes_idx,
        })
    }

    /// Detect the single most confident face in an RGB24 frame.
    ///
    /// Returns `None` when no candidate clears the score threshold.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<FaceBox>, DetectorError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(DetectorError::InvalidFrame {
                expected,
                actual: rgb.len(),
            });
        }

        let (input, letterbox) = self.preprocess(rgb, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[self.scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[self.boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        Ok(
            best_candidate(scores, boxes, self.options.score_threshold).and_then(
                |(idx, score)| {
                    decode_box(boxes, idx, score, &letterbox, width as f32, height as f32)
                },
            ),
        )
    }

    /// Preprocess an RGB24 frame into a NCHW float tensor with letterbox
    /// padding, sampling the source bilinearly.
    fn preprocess(&self, rgb: &[u8], width: usize, height: usize) -> (Array4<f32>, LetterboxInfo) {
        let side = self.options.input_size;

        let scale_w = side as f32 / width as f32;
        let scale_h = side as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = (width as f32 * scale).round() as usize;
        let new_h = (height as f32 * scale).round() as usize;
        let pad_x = (side - new_w) as f32 / 2.0;
        let pad_y = (side - new_h) as f32 / 2.0;
        let pad_x0 = pad_x.floor() as usize;
        let pad_y0 = pad_y.floor() as usize;

        let letterbox = LetterboxInfo { scale, pad_x, pad_y };

        let inv_scale = 1.0 / scale;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        for y in 0..side {
            let in_rows = y >= pad_y0 && y < pad_y0 + new_h;
            for x in 0..side {
                if !(in_rows && x >= pad_x0 && x < pad_x0 + new_w) {
                    // Pad value normalizes to 0.0.
                    for c in 0..3 {
                        tensor[[0, c, y, x]] = 0.0;
                    }
                    continue;
                }

                let src_x = ((x - pad_x0) as f32 + 0.5) * inv_scale - 0.5;
                let src_y = ((y - pad_y0) as f32 + 0.5) * inv_scale - 0.5;

                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
                let y1 = (y0 + 1).min(height - 1);
                let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

                for c in 0..3 {
                    let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
                    let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
                    let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
                    let br = rgb[(y1 * width + x1) * 3 + c] as f32;

                    let value = tl * (1.0 - fx) * (1.0 - fy)
                        + tr * fx * (1.0 - fy)
                        + bl * (1.0 - fx) * fy
                        + br * fx * fy;

                    tensor[[0, c, y, x]] = (value - DETECTOR_MEAN) / DETECTOR_STD;
                }
            }
        }

        (tensor, letterbox)
    }
}

/// Discover output tensor ordering by name.
///
/// Exports may name the tensors "scores"/"boxes" or carry generic numeric
/// names; fall back to positional ordering [0]=scores, [1]=boxes.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");
    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(
                ?names,
                "detector output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Index and score of the best candidate above the threshold, if any.
fn best_candidate(scores: &[f32], boxes: &[f32], threshold: f32) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score <= threshold {
            continue;
        }
        if boxes.len() < (idx + 1) * 4 {
            continue;
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((idx, score));
        }
    }
    best
}

/// Map a candidate's `[x1, y1, x2, y2]` from letterboxed input space back
/// to frame coordinates, clamped to frame bounds.
///
/// Returns `None` for a box that degenerates to zero area after clamping.
fn decode_box(
    boxes: &[f32],
    idx: usize,
    score: f32,
    letterbox: &LetterboxInfo,
    frame_w: f32,
    frame_h: f32,
) -> Option<FaceBox> {
    let off = idx * 4;
    let coords = boxes.get(off..off + 4)?;

    let x1 = ((coords[0] - letterbox.pad_x) / letterbox.scale).clamp(0.0, frame_w);
    let y1 = ((coords[1] - letterbox.pad_y) / letterbox.scale).clamp(0.0, frame_h);
    let x2 = ((coords[2] - letterbox.pad_x) / letterbox.scale).clamp(0.0, frame_w);
    let y2 = ((coords[3] - letterbox.pad_y) / letterbox.scale).clamp(0.0, frame_h);

    let width = x2 - x1;
    let height = y2 - y1;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    Some(FaceBox {
        x: x1,
        y: y1,
        width,
        height,
        confidence: score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letterbox_for(frame_w: f32, frame_h: f32, side: f32) -> LetterboxInfo {
        let scale = (side / frame_w).min(side / frame_h);
        let new_w = (frame_w * scale).round();
        let new_h = (frame_h * scale).round();
        LetterboxInfo {
            scale,
            pad_x: (side - new_w) / 2.0,
            pad_y: (side - new_h) / 2.0,
        }
    }

    #[test]
    fn test_best_candidate_picks_maximum_above_threshold() {
        let scores = [0.2, 0.9, 0.7];
        let boxes = [0.0; 12];
        assert_eq!(best_candidate(&scores, &boxes, 0.5), Some((1, 0.9)));
    }

    #[test]
    fn test_best_candidate_none_below_threshold() {
        let scores = [0.1, 0.3, 0.49];
        let boxes = [0.0; 12];
        assert_eq!(best_candidate(&scores, &boxes, 0.5), None);
    }

    #[test]
    fn test_best_candidate_skips_truncated_box_rows() {
        // Second score is higher but has no box data behind it.
        let scores = [0.6, 0.9];
        let boxes = [0.0; 4];
        assert_eq!(best_candidate(&scores, &boxes, 0.5), Some((0, 0.6)));
    }

    #[test]
    fn test_best_candidate_empty() {
        assert_eq!(best_candidate(&[], &[], 0.5), None);
    }

    #[test]
    fn test_decode_box_identity_without_letterbox() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let boxes = [10.0, 20.0, 60.0, 70.0];
        let face = decode_box(&boxes, 0, 0.8, &letterbox, 640.0, 480.0).unwrap();
        assert_eq!((face.x, face.y, face.width, face.height), (10.0, 20.0, 50.0, 50.0));
        assert!((face.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_box_clamps_to_frame() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let boxes = [-20.0, -10.0, 700.0, 500.0];
        let face = decode_box(&boxes, 0, 0.9, &letterbox, 640.0, 480.0).unwrap();
        assert_eq!((face.x, face.y), (0.0, 0.0));
        assert_eq!((face.width, face.height), (640.0, 480.0));
    }

    #[test]
    fn test_decode_box_degenerate_after_clamp() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        // Entirely left of the frame; clamps to a zero-width line.
        let boxes = [-50.0, 10.0, -10.0, 60.0];
        assert!(decode_box(&boxes, 0, 0.9, &letterbox, 640.0, 480.0).is_none());
    }

    #[test]
    fn test_letterbox_coordinate_roundtrip() {
        let letterbox = letterbox_for(320.0, 240.0, 416.0);

        let orig_x = 100.0f32;
        let orig_y = 50.0f32;
        let boxed_x = orig_x * letterbox.scale + letterbox.pad_x;
        let boxed_y = orig_y * letterbox.scale + letterbox.pad_y;

        let recovered_x = (boxed_x - letterbox.pad_x) / letterbox.scale;
        let recovered_y = (boxed_y - letterbox.pad_y) / letterbox.scale;

        assert!((recovered_x - orig_x).abs() < 0.1, "x: {recovered_x} vs {orig_x}");
        assert!((recovered_y - orig_y).abs() < 0.1, "y: {recovered_y} vs {orig_y}");
    }

    #[test]
    fn test_decode_box_through_letterbox() {
        let letterbox = letterbox_for(640.0, 480.0, 416.0);
        // A box at frame (10, 10, 60, 60), expressed in letterboxed coords.
        let boxes = [
            10.0 * letterbox.scale + letterbox.pad_x,
            10.0 * letterbox.scale + letterbox.pad_y,
            60.0 * letterbox.scale + letterbox.pad_x,
            60.0 * letterbox.scale + letterbox.pad_y,
        ];
        let face = decode_box(&boxes, 0, 0.7, &letterbox, 640.0, 480.0).unwrap();
        assert!((face.x - 10.0).abs() < 0.1);
        assert!((face.y - 10.0).abs() < 0.1);
        assert!((face.width - 50.0).abs() < 0.1);
        assert!((face.height - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..2).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1));
    }

    #[test]
    fn test_default_options() {
        let options = DetectorOptions::default();
        assert_eq!(options.input_size, 416);
        assert!((options.score_threshold - 0.5).abs() < 1e-6);
    }
}
