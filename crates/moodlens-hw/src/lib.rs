//! moodlens-hw — Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access and YUYV to RGB conversion.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo};
pub use frame::Frame;
