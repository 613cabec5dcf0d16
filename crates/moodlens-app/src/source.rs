//! Frame feed: a dedicated capture thread publishing the latest frame.

use moodlens_hw::{Camera, CameraError, Frame};
use tokio::sync::watch;

/// Spawn the capture thread.
///
/// The watch slot starts at `None` and is replaced with every captured
/// frame; the sampling loop treats `None` as "camera not ready yet".
/// The thread exits when the shutdown flag flips, every receiver is
/// gone, or the camera fails.
pub fn spawn_capture(
    camera: Camera,
    frames: watch::Sender<Option<Frame>>,
    shutdown: watch::Receiver<bool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("moodlens-capture".into())
        .spawn(move || {
            tracing::info!(device = %camera.device_path, "capture thread started");
            if let Err(e) = pump(&camera, &frames, &shutdown) {
                tracing::error!(error = %e, "capture loop failed");
            }
            tracing::info!("capture thread exiting");
        })
        .expect("failed to spawn capture thread")
}

fn pump(
    camera: &Camera,
    frames: &watch::Sender<Option<Frame>>,
    shutdown: &watch::Receiver<bool>,
) -> Result<(), CameraError> {
    let mut stream = camera.stream()?;
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        let frame = stream.next_frame()?;
        if frames.send(Some(frame)).is_err() {
            // All receivers are gone; nothing left to feed.
            return Ok(());
        }
    }
}
