use anyhow::{Context, Result};

use super::curve::{DrawCommand, Point};

pub type Rgb = [u8; 3];

/// Polyline resolution per cubic segment when rasterizing.
const OUTLINE_STEPS: usize = 8;

/// Y of the curve's top edge at the center of each of `columns` equal-width
/// columns, in the command's own units. Empty commands sit on the baseline.
pub fn column_tops(cmd: &DrawCommand, columns: usize) -> Vec<f32> {
    let outline = cmd.outline(OUTLINE_STEPS);
    if outline.len() < 2 || columns == 0 {
        return vec![cmd.height; columns];
    }

    let column_width = cmd.width / columns as f32;
    (0..columns)
        .map(|c| y_at(&outline, (c as f32 + 0.5) * column_width))
        .collect()
}

/// Linear interpolation along a polyline sorted by x, clamped at both ends.
fn y_at(outline: &[Point], x: f32) -> f32 {
    let idx = outline.partition_point(|p| p.x < x);
    if idx == 0 {
        return outline[0].y;
    }
    if idx >= outline.len() {
        return outline[outline.len() - 1].y;
    }

    let (a, b) = (outline[idx - 1], outline[idx]);
    let span = b.x - a.x;
    if span <= f32::EPSILON {
        return b.y;
    }
    a.y + (b.y - a.y) * (x - a.x) / span
}

/// Bytes in one RGBA8 frame, or `None` if that does not fit in memory.
pub fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

/// RGBA8 surface the curve is filled into, row-major, top row first.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = rgba_len(width, height)
            .with_context(|| format!("Canvas of {}x{} is too large", width, height))?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    pub fn clear(&mut self, color: Rgb) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[color[0], color[1], color[2], 255]);
        }
    }

    /// Fills the area between the curve and the baseline. The command is
    /// scaled to the canvas; the top edge is anti-aliased by row coverage.
    pub fn fill_curve(&mut self, cmd: &DrawCommand, color: Rgb) {
        if cmd.is_empty() || cmd.height <= 0.0 {
            return;
        }

        let scale_y = self.height as f32 / cmd.height;
        let tops = column_tops(cmd, self.width as usize);

        for (x, top) in tops.into_iter().enumerate() {
            let top = (top * scale_y).clamp(0.0, self.height as f32);
            let first_row = top.floor() as u32;

            for y in first_row..self.height {
                let coverage = (y as f32 + 1.0 - top).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend(x as u32, y, color, coverage);
                }
            }
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgb, coverage: f32) {
        let i = self.offset(x, y);
        for (channel, &src) in self.pixels[i..i + 3].iter_mut().zip(&color) {
            let dst = *channel as f32;
            *channel = (dst + (src as f32 - dst) * coverage).round() as u8;
        }
        self.pixels[i + 3] = 255;
    }
}
