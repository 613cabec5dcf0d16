//! The sampling loop: fixed-cadence frame analysis driving the overlay
//! and the emotion label.
//!
//! Each tick pulls the current frame, runs the analyzer off-thread and
//! applies the outcome to shared UI state. Ticks that fire while an
//! analysis is still running are skipped rather than queued, so at most
//! one inference call is in flight. A completion that races shutdown is
//! discarded before it can touch the overlay or the label.

use crate::overlay::{DisplaySize, OverlaySurface};
use crate::state::LabelState;
use moodlens_core::{FaceAnalysis, FrameAnalyzer};
use moodlens_hw::Frame;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub struct Sampler<A> {
    analyzer: Arc<Mutex<A>>,
    interval: Duration,
    frames: watch::Receiver<Option<Frame>>,
    display: watch::Receiver<DisplaySize>,
    overlay: Arc<Mutex<OverlaySurface>>,
    label: LabelState,
    shutdown: watch::Receiver<bool>,
}

impl<A: FrameAnalyzer + 'static> Sampler<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analyzer: A,
        interval: Duration,
        frames: watch::Receiver<Option<Frame>>,
        display: watch::Receiver<DisplaySize>,
        overlay: Arc<Mutex<OverlaySurface>>,
        label: LabelState,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            analyzer: Arc::new(Mutex::new(analyzer)),
            interval,
            frames,
            display,
            overlay,
            label,
            shutdown,
        }
    }

    /// Run until the shutdown flag flips. No tick fires and no state is
    /// written after that point.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "sampling loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if *self.shutdown.borrow() {
                break;
            }
            self.tick().await;
            if *self.shutdown.borrow() {
                break;
            }
        }

        tracing::info!("sampling loop stopped");
    }

    async fn tick(&mut self) {
        // Precondition gate: the camera may not have produced a frame
        // yet, and the view may not have published its size.
        let Some(frame) = self.frames.borrow().clone() else {
            tracing::trace!("no frame available; skipping tick");
            return;
        };
        if frame.width == 0 || frame.height == 0 {
            return;
        }
        let display = *self.display.borrow();
        if display.width == 0 || display.height == 0 {
            tracing::trace!("display size unknown; skipping tick");
            return;
        }

        let (frame_w, frame_h) = (frame.width, frame.height);
        let analyzer = Arc::clone(&self.analyzer);
        let inference = tokio::task::spawn_blocking(move || {
            let mut analyzer = analyzer.lock().unwrap_or_else(|e| e.into_inner());
            analyzer.analyze(&frame.data, frame.width, frame.height)
        });

        // Race the in-flight call against shutdown; a completion that
        // loses the race never reaches the overlay or the label.
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.changed() => {
                tracing::debug!("shutdown during inference; discarding in-flight result");
                return;
            }
            outcome = inference => outcome,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "inference failed; treating tick as no face");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "inference task aborted; treating tick as no face");
                None
            }
        };

        if *self.shutdown.borrow() {
            return;
        }

        let scaled = result.map(|a| rescale_to_display(a, frame_w, frame_h, display));

        {
            let mut overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
            overlay.resize(display);
            overlay.render(scaled.as_ref());
        }

        // On a no-face tick the overlay is cleared but the previously
        // published label is held.
        if let Some(analysis) = &scaled {
            let emotion = analysis.scores.dominant();
            self.label.publish(emotion);
            tracing::debug!(
                emotion = %emotion,
                confidence = analysis.face.confidence,
                "face analyzed"
            );
        }
    }
}

/// Map a frame-coordinate analysis onto the display surface.
fn rescale_to_display(
    analysis: FaceAnalysis,
    frame_w: u32,
    frame_h: u32,
    display: DisplaySize,
) -> FaceAnalysis {
    let sx = display.width as f32 / frame_w as f32;
    let sy = display.height as f32 / frame_h as f32;
    FaceAnalysis {
        face: analysis.face.scaled(sx, sy),
        scores: analysis.scores,
    }
}
