use moodlens_core::{default_model_dir, DetectorOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Default sampling cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// Application configuration, loaded from `MOODLENS_*` environment
/// variables with defaults; CLI flags override individual fields.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Sampling loop cadence.
    pub poll_interval: Duration,
    /// Detector square input size in pixels.
    pub detector_input_size: usize,
    /// Minimum detection confidence.
    pub score_threshold: f32,
}

impl Config {
    pub fn from_env() -> Self {
        let detector_defaults = DetectorOptions::default();
        Self {
            camera_device: std::env::var("MOODLENS_CAMERA_DEVICE")
                .unwrap_or_else(|_| DEFAULT_CAMERA_DEVICE.to_string()),
            model_dir: std::env::var("MOODLENS_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_model_dir()),
            // A zero interval would make the ticker panic.
            poll_interval: Duration::from_millis(
                env_u64("MOODLENS_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS).max(1),
            ),
            detector_input_size: env_usize(
                "MOODLENS_DETECTOR_INPUT_SIZE",
                detector_defaults.input_size,
            ),
            score_threshold: env_f32(
                "MOODLENS_SCORE_THRESHOLD",
                detector_defaults.score_threshold,
            ),
        }
    }

    /// Detector tuning derived from this configuration.
    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            input_size: self.detector_input_size,
            score_threshold: self.score_threshold,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_helpers() {
        assert_eq!(env_u64("MOODLENS_TEST_UNSET", 7), 7);

        std::env::set_var("MOODLENS_TEST_U64", "250");
        assert_eq!(env_u64("MOODLENS_TEST_U64", 7), 250);

        std::env::set_var("MOODLENS_TEST_BAD", "not-a-number");
        assert_eq!(env_f32("MOODLENS_TEST_BAD", 0.5), 0.5);
        assert_eq!(env_usize("MOODLENS_TEST_BAD", 416), 416);
    }
}
