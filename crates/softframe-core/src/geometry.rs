//! Integer pixel geometry for overlay placement.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates.
///
/// The origin may be negative while a layout is being computed; clip it
/// against the frame before touching pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` frame.
    #[inline]
    pub const fn frame(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(self) -> i64 {
        self.y as i64 + self.height as i64
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Area of the rectangle.
    #[inline]
    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check if a point is inside the rectangle.
    pub fn contains(self, x: i32, y: i32) -> bool {
        x >= self.x && (x as i64) < self.right() && y >= self.y && (y as i64) < self.bottom()
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 as i64 || y1 <= y0 as i64 {
            return None;
        }
        Some(Self::new(
            x0,
            y0,
            (x1 - x0 as i64) as u32,
            (y1 - y0 as i64) as u32,
        ))
    }

    /// Move the rectangle so it lies inside `bounds` where possible,
    /// keeping its size. Oversized rectangles are pinned to the bounds origin.
    pub fn clamp_within(self, bounds: Self) -> Self {
        let max_x = bounds.right() - self.width as i64;
        let max_y = bounds.bottom() - self.height as i64;
        let x = (self.x as i64).min(max_x).max(bounds.x as i64);
        let y = (self.y as i64).min(max_y).max(bounds.y as i64);
        Self::new(x as i32, y as i32, self.width, self.height)
    }
}
