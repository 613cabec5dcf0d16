//! moodlens-core — Face detection and expression classification engine.
//!
//! Runs a face detector and a seven-class expression classifier via
//! ONNX Runtime for CPU inference, and exposes the [`FrameAnalyzer`]
//! seam the sampling loop consumes.

pub mod analyzer;
pub mod classifier;
pub mod detector;
pub mod types;

pub use analyzer::{default_model_dir, AnalyzerError, FrameAnalyzer, OnnxAnalyzer};
pub use detector::DetectorOptions;
pub use types::{Emotion, ExpressionScores, FaceAnalysis, FaceBox};
