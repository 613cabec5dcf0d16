//! Preview window: composites the live frame, the overlay surface and
//! the emotion label banner.

use crate::font;
use crate::overlay::{DisplaySize, OverlaySurface};
use crate::state::Shutdown;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use moodlens_core::Emotion;
use moodlens_hw::Frame;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const TARGET_FPS: usize = 60;
const BANNER_HEIGHT: usize = 24;
const BANNER_TEXT_SCALE: u32 = 2;
const BANNER_MARGIN: usize = 8;

pub struct ViewParams {
    pub title: String,
    pub width: usize,
    pub height: usize,
    pub frames: watch::Receiver<Option<Frame>>,
    pub overlay: Arc<Mutex<OverlaySurface>>,
    pub label: watch::Receiver<Option<Emotion>>,
    pub display: watch::Sender<DisplaySize>,
    pub shutdown: Shutdown,
}

/// Run the preview window until the user closes it or shutdown is
/// requested elsewhere. Blocking; call from a dedicated thread.
pub fn run(params: ViewParams) {
    let ViewParams {
        title,
        width,
        height,
        frames,
        overlay,
        label,
        display,
        shutdown,
    } = params;

    let mut window = match Window::new(
        &title,
        width,
        height,
        WindowOptions {
            resize: true,
            ..WindowOptions::default()
        },
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "failed to open preview window");
            shutdown.trigger();
            return;
        }
    };
    window.set_target_fps(TARGET_FPS);

    let shutdown_rx = shutdown.subscribe();
    let mut buffer: Vec<u32> = Vec::new();
    let mut snapshot_seq = 0u32;

    while window.is_open() && !window.is_key_down(Key::Escape) && !*shutdown_rx.borrow() {
        let (w, h) = window.get_size();
        if w == 0 || h == 0 {
            window.update();
            continue;
        }

        // The sampling loop rescales detection geometry against this.
        let size = DisplaySize::new(w as u32, h as u32);
        if *display.borrow() != size {
            display.send_replace(size);
        }

        buffer.resize(w * h, 0);
        buffer.fill(0);

        if let Some(frame) = frames.borrow().as_ref() {
            blit_scaled(frame, &mut buffer, w, h);
        }

        {
            let surface = overlay.lock().unwrap_or_else(|e| e.into_inner());
            if surface.size() == size {
                composite_overlay(&surface, &mut buffer, w, h);
            }
        }

        draw_banner(&mut buffer, w, h, *label.borrow());

        for key in window.get_keys_pressed(KeyRepeat::No) {
            if key == Key::S {
                snapshot_seq += 1;
                save_snapshot(&buffer, w, h, snapshot_seq);
            }
        }

        if let Err(e) = window.update_with_buffer(&buffer, w, h) {
            tracing::warn!(error = %e, "window update failed");
        }
    }

    tracing::info!("preview window closed");
    shutdown.trigger();
}

/// Nearest-neighbor blit of an RGB24 frame into a 0RGB buffer.
fn blit_scaled(frame: &Frame, buffer: &mut [u32], w: usize, h: usize) {
    let fw = frame.width as usize;
    let fh = frame.height as usize;
    if fw == 0 || fh == 0 || frame.data.len() < fw * fh * 3 {
        return;
    }
    for y in 0..h {
        let sy = y * fh / h;
        for x in 0..w {
            let sx = x * fw / w;
            let idx = (sy * fw + sx) * 3;
            let r = frame.data[idx] as u32;
            let g = frame.data[idx + 1] as u32;
            let b = frame.data[idx + 2] as u32;
            buffer[y * w + x] = (r << 16) | (g << 8) | b;
        }
    }
}

/// Alpha-over the RGBA overlay onto the 0RGB buffer. The surface is
/// known to match the buffer size.
fn composite_overlay(surface: &OverlaySurface, buffer: &mut [u32], w: usize, h: usize) {
    let pixels = surface.pixels();
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 4;
            let a = pixels[idx + 3] as u32;
            if a == 0 {
                continue;
            }
            let r = pixels[idx] as u32;
            let g = pixels[idx + 1] as u32;
            let b = pixels[idx + 2] as u32;

            let dst = buffer[y * w + x];
            let dr = (dst >> 16) & 0xFF;
            let dg = (dst >> 8) & 0xFF;
            let db = dst & 0xFF;

            let out_r = (r * a + dr * (255 - a)) / 255;
            let out_g = (g * a + dg * (255 - a)) / 255;
            let out_b = (b * a + db * (255 - a)) / 255;
            buffer[y * w + x] = (out_r << 16) | (out_g << 8) | out_b;
        }
    }
}

/// Dimmed strip at the bottom with the current label, or a placeholder
/// while no result has ever arrived.
fn draw_banner(buffer: &mut [u32], w: usize, h: usize, label: Option<Emotion>) {
    if h < BANNER_HEIGHT {
        return;
    }
    let top = h - BANNER_HEIGHT;
    for pixel in &mut buffer[top * w..h * w] {
        // Per-channel >>2 (quarter brightness).
        *pixel = (*pixel >> 2) & 0x003F_3F3F;
    }

    let text = match label {
        Some(emotion) => format!(
            "DETECTED EMOTION: {}",
            emotion.label().to_ascii_uppercase()
        ),
        None => "DETECTING...".to_string(),
    };
    let tx = w
        .saturating_sub(font::text_width(&text, BANNER_TEXT_SCALE) as usize)
        .max(2 * BANNER_MARGIN)
        / 2;
    let ty = top + (BANNER_HEIGHT - (font::GLYPH_HEIGHT * BANNER_TEXT_SCALE) as usize) / 2;
    font::draw_text(&text, BANNER_TEXT_SCALE, |gx, gy| {
        let x = tx + gx as usize;
        let y = ty + gy as usize;
        if x < w && y < h {
            buffer[y * w + x] = 0x00FF_FFFF;
        }
    });
}

fn save_snapshot(buffer: &[u32], w: usize, h: usize, seq: u32) {
    let path = format!("moodlens-{seq:03}.png");
    let mut img = image::RgbImage::new(w as u32, h as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let v = buffer[y as usize * w + x as usize];
        *pixel = image::Rgb([(v >> 16) as u8, (v >> 8) as u8, v as u8]);
    }
    match img.save(&path) {
        Ok(()) => tracing::info!(path = %path, "snapshot saved"),
        Err(e) => tracing::warn!(error = %e, path = %path, "snapshot save failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodlens_core::{ExpressionScores, FaceAnalysis, FaceBox};
    use std::time::Instant;

    fn gray_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            data: vec![value; (width * height * 3) as usize],
            width,
            height,
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_blit_scaled_fills_buffer() {
        let frame = gray_frame(4, 4, 200);
        let mut buffer = vec![0u32; 8 * 8];
        blit_scaled(&frame, &mut buffer, 8, 8);
        assert!(buffer.iter().all(|&p| p == 0x00C8_C8C8));
    }

    #[test]
    fn test_blit_short_frame_is_noop() {
        let mut frame = gray_frame(4, 4, 200);
        frame.data.truncate(5);
        let mut buffer = vec![0u32; 8 * 8];
        blit_scaled(&frame, &mut buffer, 8, 8);
        assert!(buffer.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_composite_opaque_overlay_pixel_replaces() {
        let mut surface = OverlaySurface::new();
        surface.resize(DisplaySize::new(60, 60));
        surface.render(Some(&FaceAnalysis {
            face: FaceBox {
                x: 10.0,
                y: 10.0,
                width: 20.0,
                height: 20.0,
                confidence: 0.9,
            },
            scores: ExpressionScores::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        }));

        let mut buffer = vec![0u32; 60 * 60];
        composite_overlay(&surface, &mut buffer, 60, 60);
        // An outline pixel is fully opaque: the buffer takes its color.
        let v = buffer[10 * 60 + 10];
        assert_ne!(v, 0);
        // A pixel left of the box and readout stays black.
        assert_eq!(buffer[55 * 60 + 5], 0);
    }

    #[test]
    fn test_banner_draws_placeholder_without_label() {
        let w = 320usize;
        let h = 240usize;
        let mut buffer = vec![0u32; w * h];
        draw_banner(&mut buffer, w, h, None);
        let banner = &buffer[(h - BANNER_HEIGHT) * w..];
        assert!(banner.iter().any(|&p| p == 0x00FF_FFFF));
    }

    #[test]
    fn test_banner_skipped_on_tiny_window() {
        let mut buffer = vec![0u32; 10 * 10];
        draw_banner(&mut buffer, 10, 10, Some(Emotion::Happy));
        assert!(buffer.iter().all(|&p| p == 0));
    }
}
