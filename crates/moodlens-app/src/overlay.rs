//! Overlay surface: a transparent RGBA layer drawn over the video.
//!
//! The sampling loop renders into it; the view composites it onto the
//! scaled camera image. Rendering is pure: output depends only on the
//! passed analysis and the current surface size.

use crate::font;
use moodlens_core::{ExpressionScores, FaceAnalysis};

const BOX_COLOR: [u8; 4] = [64, 220, 120, 255];
const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];
const BAR_COLOR: [u8; 4] = [64, 220, 120, 200];
const OUTLINE_THICKNESS: i32 = 2;
const READOUT_TOP_N: usize = 3;
const READOUT_LINE_HEIGHT: i32 = 12;
const READOUT_BAR_WIDTH: f32 = 64.0;

/// Size of the rendered video area, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// RGBA8 drawing surface matching the video's display size.
///
/// Starts at 0x0; rendering against a never-resized surface draws
/// nothing, so callers resize before the first render.
pub struct OverlaySurface {
    size: DisplaySize,
    pixels: Vec<u8>,
}

impl OverlaySurface {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            size: DisplaySize::default(),
            pixels: Vec::new(),
        }
    }

    /// Match the surface to the display size. Idempotent: a no-op when
    /// the size is unchanged, otherwise reallocates a cleared buffer.
    pub fn resize(&mut self, size: DisplaySize) {
        if size == self.size {
            return;
        }
        self.size = size;
        self.pixels = vec![0; size.width as usize * size.height as usize * 4];
    }

    /// Clear the whole surface, then draw the box outline and the score
    /// readout when an analysis is present. The analysis is expected in
    /// display coordinates.
    pub fn render(&mut self, analysis: Option<&FaceAnalysis>) {
        self.pixels.fill(0);
        let Some(analysis) = analysis else {
            return;
        };
        if self.size.width == 0 || self.size.height == 0 {
            return;
        }

        let x = analysis.face.x.round() as i32;
        let y = analysis.face.y.round() as i32;
        let w = analysis.face.width.round() as i32;
        let h = analysis.face.height.round() as i32;

        self.outline(x, y, w, h);
        self.readout(x, y + h + 4, &analysis.scores);
    }

    pub fn size(&self) -> DisplaySize {
        self.size
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at `(x, y)`. Test helper; panics outside the surface.
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.size.width && y < self.size.height);
        let idx = (y as usize * self.size.width as usize + x as usize) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    fn outline(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let t = OUTLINE_THICKNESS;
        self.fill_rect(x, y, w, t, BOX_COLOR);
        self.fill_rect(x, y + h - t, w, t, BOX_COLOR);
        self.fill_rect(x, y, t, h, BOX_COLOR);
        self.fill_rect(x + w - t, y, t, h, BOX_COLOR);
    }

    fn readout(&mut self, x: i32, mut y: i32, scores: &ExpressionScores) {
        for (emotion, value) in scores.top(READOUT_TOP_N) {
            let text = format!("{} {:.2}", emotion.label(), value);
            self.text(x, y, &text, TEXT_COLOR);
            let bar = (value.clamp(0.0, 1.0) * READOUT_BAR_WIDTH) as i32;
            self.fill_rect(x, y + font::GLYPH_HEIGHT as i32 + 1, bar, 2, BAR_COLOR);
            y += READOUT_LINE_HEIGHT;
        }
    }

    fn text(&mut self, x: i32, y: i32, text: &str, color: [u8; 4]) {
        font::draw_text(text, 1, |gx, gy| {
            self.put_pixel(x + gx as i32, y + gy as i32, color);
        });
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: [u8; 4]) {
        for yy in y..y + h {
            for xx in x..x + w {
                self.put_pixel(xx, yy, color);
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.size.width as i32 || y >= self.size.height as i32 {
            return;
        }
        let idx = (y as usize * self.size.width as usize + x as usize) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&color);
    }
}
