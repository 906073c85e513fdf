//! Subtitle burn-in.
//!
//! Text is rasterized once into a [`GlyphBitmap`] and reused for as long as
//! the text, the style and the frame geometry stay the same. Blending the
//! cached bitmap into each frame is the only per-tick cost.

pub mod font;
pub mod track;

pub use track::{SubtitleCue, SubtitleError, SubtitleTrack};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use softframe_core::{Rect, Surface};
use std::sync::Arc;
use tracing::{debug, trace};

/// Largest halo radius in raster pixels.
const MAX_STROKE: u32 = 32;

/// Appearance of burned-in subtitles. Colors are RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub enabled: bool,
    /// Glyph height in output pixels.
    pub font_size: f32,
    pub text_color: [u8; 4],
    pub stroke_color: [u8; 4],
    /// Halo radius in pixels; 0 disables the stroke.
    pub stroke_width: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            font_size: 42.0,
            text_color: [255, 255, 255, 255],
            stroke_color: [0, 0, 0, 255],
            stroke_width: 2,
        }
    }
}

/// Rasterized subtitle text in BGRA, transparent where alpha is 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 4]>,
}

impl GlyphBitmap {
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    text: String,
    style: SubtitleStyle,
    scale: u32,
    stroke: u32,
    downscaled: bool,
    wrap_width: u32,
    max_height: u32,
}

#[derive(Debug)]
struct CacheEntry {
    key: CacheKey,
    bitmap: Arc<GlyphBitmap>,
}

/// Burns subtitle text into surfaces, caching the last rasterization.
#[derive(Debug)]
pub struct SubtitleCompositor {
    safe_width: f32,
    cache: Option<CacheEntry>,
    showing: bool,
    rasterizations: u64,
}

impl SubtitleCompositor {
    /// `safe_width` is the fraction of the frame width text may span.
    pub fn new(safe_width: f32) -> Self {
        Self {
            safe_width: safe_width.clamp(0.1, 1.0),
            cache: None,
            showing: false,
            rasterizations: 0,
        }
    }

    /// Draw `text` into the bottom of `surface`.
    ///
    /// Returns false, and forgets any previously shown text, when the style
    /// is disabled, there is no text, or the surface is unusable.
    pub fn composite(
        &mut self,
        surface: &mut Surface,
        text: Option<&str>,
        style: &SubtitleStyle,
    ) -> bool {
        let text = match text {
            Some(t) if style.enabled && !t.trim().is_empty() => t,
            _ => {
                if self.showing {
                    trace!("subtitle cleared");
                }
                self.showing = false;
                return false;
            }
        };
        if surface.validate().is_err() {
            self.showing = false;
            return false;
        }

        let dims = surface.dimensions();
        let downscaled = dims.is_uhd();
        let factor = if downscaled { 2 } else { 1 };
        let wrap_width = ((dims.width as f32 * self.safe_width) as u32 / factor).max(1);
        let max_height = (dims.height / factor).max(1);
        let stroke = match style.stroke_width {
            0 => 0,
            w => (w / factor).max(1),
        };
        let (scale, stroke) = fit_to_box(
            font::scale_for(style.font_size) / factor,
            stroke,
            wrap_width,
            max_height,
        );

        let key = CacheKey {
            text: text.to_string(),
            style: *style,
            scale,
            stroke,
            downscaled,
            wrap_width,
            max_height,
        };
        let bitmap = self.bitmap_for(key);

        let out_width = bitmap.width * factor;
        let out_height = bitmap.height * factor;
        let font_size = style.font_size.clamp(0.0, dims.height as f32);
        let margin = (dims.height as f32 * 0.04 + font_size * 0.25) as i64;
        let x = (dims.width as i64 - out_width as i64) / 2;
        let y = dims.height as i64 - margin - out_height as i64;
        let frame = Rect::frame(dims.width, dims.height);
        let placed = Rect::new(
            x.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            y.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            out_width,
            out_height,
        )
        .clamp_within(frame);

        blit(surface, &bitmap, placed, factor);
        self.showing = true;
        true
    }

    /// Whether the last call drew text.
    pub fn is_showing(&self) -> bool {
        self.showing
    }

    /// Rasterizations performed so far.
    pub fn rasterizations(&self) -> u64 {
        self.rasterizations
    }

    /// The cached bitmap, if any.
    pub fn cached_bitmap(&self) -> Option<Arc<GlyphBitmap>> {
        self.cache.as_ref().map(|c| Arc::clone(&c.bitmap))
    }

    /// Drop the cache and the showing state.
    pub fn reset(&mut self) {
        self.cache = None;
        self.showing = false;
    }

    fn bitmap_for(&mut self, key: CacheKey) -> Arc<GlyphBitmap> {
        if let Some(entry) = &self.cache {
            if entry.key == key {
                return Arc::clone(&entry.bitmap);
            }
        }
        let mut lines = wrap(&key.text, key.scale, key.stroke, key.wrap_width);
        lines.truncate(max_lines(key.scale, key.stroke, key.max_height));
        let bitmap = Arc::new(rasterize(&lines, &key.style, key.scale, key.stroke));
        self.rasterizations += 1;
        debug!(
            width = bitmap.width,
            height = bitmap.height,
            lines = lines.len(),
            downscaled = key.downscaled,
            "subtitle rasterized"
        );
        self.cache = Some(CacheEntry {
            key,
            bitmap: Arc::clone(&bitmap),
        });
        bitmap
    }
}

impl Default for SubtitleCompositor {
    fn default() -> Self {
        Self::new(0.9)
    }
}

/// Shrink the glyph scale and halo until one glyph with its halo fits a
/// `max_width` x `max_height` box.
fn fit_to_box(scale: u32, stroke: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let stroke = stroke.min(MAX_STROKE).min(max_width.min(max_height) / 4);
    let fit_x = max_width.saturating_sub(stroke * 2) / font::GLYPH_WIDTH;
    let fit_y = max_height.saturating_sub(stroke * 2) / font::GLYPH_HEIGHT;
    (scale.clamp(1, fit_x.min(fit_y).max(1)), stroke)
}

/// Lines of text that fit `max_height` with the halo, at least one.
fn max_lines(scale: u32, stroke: u32, max_height: u32) -> usize {
    let usable = max_height.saturating_sub(stroke * 2);
    let gap = (font::LINE_HEIGHT - font::GLYPH_HEIGHT) * scale;
    ((usable + gap) / (font::LINE_HEIGHT * scale)).max(1) as usize
}

fn line_width(chars: usize, scale: u32) -> u32 {
    if chars == 0 {
        0
    } else {
        (chars as u32)
            .saturating_mul(font::ADVANCE)
            .saturating_sub(1)
            .saturating_mul(scale)
    }
}

/// Greedy word wrap to `max_width` pixels, honoring explicit newlines.
fn wrap(text: &str, scale: u32, stroke: u32, max_width: u32) -> Vec<Vec<char>> {
    let usable = max_width.saturating_sub(stroke * 2);
    let max_chars = (((usable / scale) + 1) / font::ADVANCE).max(1) as usize;
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line: Vec<char> = Vec::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            let needed = if line.is_empty() {
                word.len()
            } else {
                line.len() + 1 + word.len()
            };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            while word.len() > max_chars {
                let rest = word.split_off(max_chars);
                lines.push(word);
                word = rest;
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.extend(word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn rgba_to_bgra([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    [b, g, r, a]
}

/// Offsets of a filled disc of `radius`, center excluded.
fn halo_offsets(radius: u32) -> SmallVec<[(i32, i32); 32]> {
    let r = radius as i32;
    let mut offsets = SmallVec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if (dx, dy) != (0, 0) && dx * dx + dy * dy <= r * r + r {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

fn rasterize(lines: &[Vec<char>], style: &SubtitleStyle, scale: u32, stroke: u32) -> GlyphBitmap {
    let widest = lines.iter().map(|l| line_width(l.len(), scale)).max().unwrap_or(0);
    let rows = lines.len() as u32;
    let text_height = if rows == 0 {
        0
    } else {
        (rows * font::LINE_HEIGHT - (font::LINE_HEIGHT - font::GLYPH_HEIGHT)) * scale
    };
    let width = widest + stroke * 2;
    let height = text_height + stroke * 2;
    let row_len = width as usize;
    let mut fill = vec![false; row_len * height as usize];

    for (row, line) in lines.iter().enumerate() {
        let left = stroke + (widest - line_width(line.len(), scale)) / 2;
        let top = stroke + row as u32 * font::LINE_HEIGHT * scale;
        for (i, &c) in line.iter().enumerate() {
            let origin_x = left + i as u32 * font::ADVANCE * scale;
            for col in 0..font::GLYPH_WIDTH {
                for font_row in 0..font::GLYPH_HEIGHT {
                    if !font::is_set(c, col, font_row) {
                        continue;
                    }
                    for sy in 0..scale {
                        let y = top + font_row * scale + sy;
                        let start = y as usize * row_len + (origin_x + col * scale) as usize;
                        fill[start..start + scale as usize].fill(true);
                    }
                }
            }
        }
    }

    let text = rgba_to_bgra(style.text_color);
    let mut pixels = vec![[0u8; 4]; fill.len()];

    if stroke > 0 {
        let halo = rgba_to_bgra(style.stroke_color);
        let offsets = halo_offsets(stroke);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                if !fill[y as usize * row_len + x as usize] {
                    continue;
                }
                for &(dx, dy) in &offsets {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx >= 0 && ny >= 0 && (nx as u32) < width && (ny as u32) < height {
                        pixels[ny as usize * row_len + nx as usize] = halo;
                    }
                }
            }
        }
    }

    for (px, &set) in pixels.iter_mut().zip(&fill) {
        if set {
            *px = text;
        }
    }

    GlyphBitmap {
        width,
        height,
        pixels,
    }
}

#[inline]
fn blend(dst: &mut [u8; 4], src: [u8; 4]) {
    let a = src[3] as u32;
    if a == 0 {
        return;
    }
    if a == 255 {
        *dst = [src[0], src[1], src[2], 255];
        return;
    }
    let inv = 255 - a;
    for c in 0..3 {
        dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
    }
    dst[3] = 255;
}

/// Blend `bitmap` at `placed`, upscaled by `factor`, clipped to the surface.
fn blit(surface: &mut Surface, bitmap: &GlyphBitmap, placed: Rect, factor: u32) {
    let frame = Rect::frame(surface.width(), surface.height());
    let Some(visible) = placed.intersect(frame) else {
        return;
    };
    let stride = surface.stride();
    let x0 = visible.x as u32;
    let y0 = visible.y as usize;
    let off_x = (visible.x - placed.x) as u32;
    let off_y = (visible.y - placed.y) as u32;

    surface
        .data_mut()
        .par_chunks_mut(stride)
        .skip(y0)
        .take(visible.height as usize)
        .enumerate()
        .for_each(|(row, line)| {
            let src_y = (off_y + row as u32) / factor;
            if src_y >= bitmap.height {
                return;
            }
            let start = x0 as usize * 4;
            let end = start + visible.width as usize * 4;
            let dst: &mut [[u8; 4]] = bytemuck::cast_slice_mut(&mut line[start..end]);
            for (col, px) in dst.iter_mut().enumerate() {
                let src_x = (off_x + col as u32) / factor;
                if src_x < bitmap.width {
                    blend(px, bitmap.pixel(src_x, src_y));
                }
            }
        });
}
