//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 camera device handle negotiated to YUYV.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV)",
                negotiated.fourcc
            )));
        }

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            "negotiated YUYV format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
        })
    }

    /// Capture a single frame through a short-lived stream.
    ///
    /// Intended for one-shot diagnostics; continuous capture should use
    /// [`Camera::stream`].
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = self.stream()?;
        stream.next_frame()
    }

    /// Start a persistent capture stream on this camera.
    pub fn stream(&self) -> Result<CameraStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;
        Ok(CameraStream {
            stream,
            width: self.width,
            height: self.height,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Persistent capture stream over an open camera.
pub struct CameraStream<'a> {
    stream: MmapStream<'a>,
    width: u32,
    height: u32,
}

impl CameraStream<'_> {
    /// Dequeue the next buffer and convert it to an RGB24 frame.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let rgb = frame::yuyv_to_rgb(buf, self.width, self.height)
            .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?;

        Ok(Frame {
            data: rgb,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }
}
