//! Expression classifier via ONNX Runtime.
//!
//! Crops the detected face region, resizes the grayscale crop to the
//! model input and softmaxes the seven emotion logits into
//! [`ExpressionScores`].

use crate::types::{Emotion, ExpressionScores, FaceBox};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EXPRESSION_INPUT_SIZE: usize = 64;
const EXPRESSION_PIXEL_SCALE: f32 = 255.0;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box does not overlap the frame")]
    EmptyCrop,
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX-backed seven-class expression classifier.
///
/// Output logits follow [`Emotion::ALL`] order.
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    /// Load the expression ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded expression model"
        );

        Ok(Self { session })
    }

    /// Classify the expression of a detected face in an RGB24 frame.
    pub fn classify(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &FaceBox,
    ) -> Result<ExpressionScores, ClassifierError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(ClassifierError::InvalidFrame {
                expected,
                actual: rgb.len(),
            });
        }

        let (crop, crop_w, crop_h) = crop_grayscale(rgb, width, height, face)?;
        let resized = resize_grayscale(&crop, crop_w, crop_h, EXPRESSION_INPUT_SIZE);

        let mut input =
            Array4::<f32>::zeros((1, 1, EXPRESSION_INPUT_SIZE, EXPRESSION_INPUT_SIZE));
        for y in 0..EXPRESSION_INPUT_SIZE {
            for x in 0..EXPRESSION_INPUT_SIZE {
                input[[0, 0, y, x]] =
                    resized[y * EXPRESSION_INPUT_SIZE + x] as f32 / EXPRESSION_PIXEL_SCALE;
            }
        }

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("logits: {e}")))?;

        if logits.len() != Emotion::COUNT {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {} logits, got {}",
                Emotion::COUNT,
                logits.len()
            )));
        }

        let probs = softmax(logits);
        let mut values = [0.0f32; Emotion::COUNT];
        values.copy_from_slice(&probs);

        Ok(ExpressionScores::new(values))
    }
}

/// Crop the face region out of an RGB24 frame as BT.601 grayscale,
/// clamped to frame bounds.
fn crop_grayscale(
    rgb: &[u8],
    width: u32,
    height: u32,
    face: &FaceBox,
) -> Result<(Vec<u8>, usize, usize), ClassifierError> {
    let w = width as usize;
    let h = height as usize;

    let x0 = face.x.max(0.0).floor() as usize;
    let y0 = face.y.max(0.0).floor() as usize;
    let x1 = ((face.x + face.width).ceil() as usize).min(w);
    let y1 = ((face.y + face.height).ceil() as usize).min(h);

    if x0 >= x1 || y0 >= y1 {
        return Err(ClassifierError::EmptyCrop);
    }

    let crop_w = x1 - x0;
    let crop_h = y1 - y0;
    let mut gray = Vec::with_capacity(crop_w * crop_h);

    for y in y0..y1 {
        for x in x0..x1 {
            let idx = (y * w + x) * 3;
            let r = rgb[idx] as u16;
            let g = rgb[idx + 1] as u16;
            let b = rgb[idx + 2] as u16;
            gray.push(((77 * r + 150 * g + 29 * b) >> 8) as u8);
        }
    }

    Ok((gray, crop_w, crop_h))
}

/// Bilinear-resize a grayscale image to a square `side × side` output.
fn resize_grayscale(gray: &[u8], width: usize, height: usize, side: usize) -> Vec<u8> {
    let mut out = vec![0u8; side * side];
    let scale_x = width as f32 / side as f32;
    let scale_y = height as f32 / side as f32;

    for y in 0..side {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..side {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = gray[y0 * width + x0] as f32;
            let tr = gray[y0 * width + x1] as f32;
            let bl = gray[y1 * width + x0] as f32;
            let br = gray[y1 * width + x1] as f32;

            let value = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            out[y * side + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|&v| v / sum).collect()
    } else {
        vec![1.0 / logits.len() as f32; logits.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    fn solid_rgb(width: usize, height: usize, pixel: [u8; 3]) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            rgb.extend_from_slice(&pixel);
        }
        rgb
    }

    #[test]
    fn test_crop_luma_weights() {
        let rgb = solid_rgb(4, 4, [255, 0, 0]);
        let (gray, w, h) = crop_grayscale(&rgb, 4, 4, &face(0.0, 0.0, 4.0, 4.0)).unwrap();
        assert_eq!((w, h), (4, 4));
        // BT.601: pure red -> (77 * 255) >> 8 = 76.
        assert!(gray.iter().all(|&p| p == 76));
    }

    #[test]
    fn test_crop_white_is_full_scale() {
        let rgb = solid_rgb(2, 2, [255, 255, 255]);
        let (gray, _, _) = crop_grayscale(&rgb, 2, 2, &face(0.0, 0.0, 2.0, 2.0)).unwrap();
        assert!(gray.iter().all(|&p| p == 255));
    }

    #[test]
    fn test_crop_clamps_to_frame_bounds() {
        let rgb = solid_rgb(8, 8, [10, 10, 10]);
        let (_, w, h) = crop_grayscale(&rgb, 8, 8, &face(-4.0, -4.0, 100.0, 100.0)).unwrap();
        assert_eq!((w, h), (8, 8));
    }

    #[test]
    fn test_crop_outside_frame_is_empty() {
        let rgb = solid_rgb(8, 8, [10, 10, 10]);
        let result = crop_grayscale(&rgb, 8, 8, &face(20.0, 20.0, 5.0, 5.0));
        assert!(matches!(result, Err(ClassifierError::EmptyCrop)));
    }

    #[test]
    fn test_crop_extracts_subregion() {
        // 4x4 frame: top-left 2x2 is bright, rest dark.
        let mut rgb = solid_rgb(4, 4, [0, 0, 0]);
        for y in 0..2 {
            for x in 0..2 {
                let idx = (y * 4 + x) * 3;
                rgb[idx] = 255;
                rgb[idx + 1] = 255;
                rgb[idx + 2] = 255;
            }
        }
        let (gray, w, h) = crop_grayscale(&rgb, 4, 4, &face(0.0, 0.0, 2.0, 2.0)).unwrap();
        assert_eq!((w, h), (2, 2));
        assert!(gray.iter().all(|&p| p == 255));
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let gray = vec![128u8; 10 * 10];
        let out = resize_grayscale(&gray, 10, 10, 64);
        assert_eq!(out.len(), 64 * 64);
        assert!(out.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_resize_identity() {
        let gray: Vec<u8> = (0..16).map(|i| (i * 16) as u8).collect();
        let out = resize_grayscale(&gray, 4, 4, 4);
        assert_eq!(out, gray);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_preserves_argmax() {
        let logits = [0.1, 3.0, 0.2, 0.3, 0.1, 0.2, 0.1];
        let probs = softmax(&logits);
        let argmax = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(argmax, 1);
    }

    #[test]
    fn test_softmax_uniform_logits() {
        let probs = softmax(&[2.0; 7]);
        assert!(probs.iter().all(|&p| (p - 1.0 / 7.0).abs() < 1e-6));
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        // Without max-subtraction these would overflow to NaN.
        let probs = softmax(&[1000.0, 999.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[0] > probs[1]);
    }
}
