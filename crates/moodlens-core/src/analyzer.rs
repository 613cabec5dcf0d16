//! The capability seam consumed by the sampling loop.
//!
//! [`OnnxAnalyzer`] chains face detection and expression classification
//! behind the [`FrameAnalyzer`] trait so the loop never sees model
//! details.

use crate::classifier::{ClassifierError, ExpressionClassifier};
use crate::detector::{DetectorError, DetectorOptions, FaceDetector};
use crate::types::FaceAnalysis;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "face_detector.onnx";
/// Expression model file name inside the model directory.
pub const EXPRESSION_MODEL_FILE: &str = "face_expression.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Per-frame analysis: detect a face and, when one is present, classify
/// its expression.
///
/// `Ok(None)` is the expected "no face this tick" outcome, not an error.
pub trait FrameAnalyzer: Send {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<FaceAnalysis>, AnalyzerError>;
}

/// The ONNX-backed analyzer: detector + classifier loaded from a model
/// directory.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    classifier: ExpressionClassifier,
}

impl OnnxAnalyzer {
    /// Load both models from `model_dir`, failing fast if either asset
    /// is missing or malformed.
    pub fn load(model_dir: &Path, options: DetectorOptions) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE), options)?;
        let classifier = ExpressionClassifier::load(&model_dir.join(EXPRESSION_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), "analyzer models loaded");
        Ok(Self {
            detector,
            classifier,
        })
    }
}

impl FrameAnalyzer for OnnxAnalyzer {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<FaceAnalysis>, AnalyzerError> {
        let Some(face) = self.detector.detect(rgb, width, height)? else {
            return Ok(None);
        };
        let scores = self.classifier.classify(rgb, width, height, &face)?;
        Ok(Some(FaceAnalysis { face, scores }))
    }
}

/// Default model directory: `$XDG_DATA_HOME/moodlens/models`, falling
/// back to `~/.local/share/moodlens/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodlens/models")
}
