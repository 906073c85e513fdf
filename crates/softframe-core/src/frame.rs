//! Pixel surfaces for software-rendered video frames.
//!
//! Every surface in the pipeline uses the same packed 32-bit layout so the
//! engine, the subtitle compositor and the display sink agree on bytes.

use crate::error::SurfaceError;
use crate::limits::STRIDE_ALIGNMENT;
use serde::{Deserialize, Serialize};

/// Pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit B, G, R, A packed (32 bits per pixel)
    #[default]
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra8 => 4,
        }
    }

    /// Format tag understood by the engine's software renderer.
    pub fn engine_tag(self) -> &'static str {
        match self {
            Self::Bgra8 => "bgr0",
        }
    }
}

/// Current decoded frame size as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

impl VideoDimensions {
    pub const ZERO: Self = Self {
        width: 0,
        height: 0,
    };

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True until the engine has reported a real video size.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether either side reaches 4K.
    pub fn is_uhd(self) -> bool {
        self.width >= crate::limits::UHD_WIDTH || self.height >= crate::limits::UHD_HEIGHT
    }
}

impl std::fmt::Display for VideoDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A packed BGRA pixel buffer with row stride.
///
/// A surface is plain owned memory; exclusive access is expressed through
/// `&mut` borrows, which is the only "lock" the render step needs.
#[derive(Debug, Clone)]
pub struct Surface {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl Surface {
    /// Allocate a zeroed surface with a 64-byte aligned stride.
    ///
    /// Aborts like any `Vec` if memory runs out; frame-path code uses
    /// [`Surface::try_new`].
    pub fn new(width: u32, height: u32) -> Self {
        let stride = Self::min_stride(width).next_multiple_of(STRIDE_ALIGNMENT);
        Self::with_stride(width, height, stride)
    }

    /// Allocate a zeroed surface with a 64-byte aligned stride, reporting
    /// size overflow or allocator failure instead of aborting.
    pub fn try_new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let failed = |reason: String| SurfaceError::Allocation {
            width,
            height,
            reason,
        };
        let stride = Self::min_stride(width)
            .checked_next_multiple_of(STRIDE_ALIGNMENT)
            .ok_or_else(|| failed("row stride overflows".into()))?;
        let len = stride
            .checked_mul(height as usize)
            .ok_or_else(|| failed("buffer size overflows".into()))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| failed(e.to_string()))?;
        data.resize(len, 0);
        Ok(Self::from_raw(data, width, height, stride))
    }

    /// Allocate a zeroed surface with an explicit stride.
    ///
    /// The stride is not checked here; call [`Surface::validate`] before
    /// handing the memory to anything that writes rows.
    pub fn with_stride(width: u32, height: u32, stride: usize) -> Self {
        Self {
            data: vec![0u8; stride * height as usize],
            width,
            height,
            stride,
            format: PixelFormat::Bgra8,
        }
    }

    /// Wrap existing memory.
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32, stride: usize) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            format: PixelFormat::Bgra8,
        }
    }

    /// Minimum legal stride for a given width.
    #[inline]
    pub fn min_stride(width: u32) -> usize {
        width as usize * PixelFormat::Bgra8.bytes_per_pixel()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn dimensions(&self) -> VideoDimensions {
        VideoDimensions::new(self.width, self.height)
    }

    /// Check the layout before any row is touched.
    pub fn validate(&self) -> Result<(), SurfaceError> {
        if self.width == 0 || self.height == 0 {
            return Err(SurfaceError::ZeroSized {
                width: self.width,
                height: self.height,
            });
        }
        let min_stride = Self::min_stride(self.width);
        if self.stride < min_stride {
            return Err(SurfaceError::StrideTooSmall {
                stride: self.stride,
                min_stride,
                width: self.width,
            });
        }
        let required = self.stride * self.height as usize;
        if self.data.len() < required {
            return Err(SurfaceError::BufferTooSmall {
                len: self.data.len(),
                required,
            });
        }
        Ok(())
    }

    /// Total bytes held by the surface.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel bytes of one row, excluding stride padding.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + Self::min_stride(self.width)]
    }

    /// Mutable pixel bytes of one row, excluding stride padding.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + Self::min_stride(self.width);
        &mut self.data[start..end]
    }

    /// One row viewed as BGRA pixels.
    #[inline]
    pub fn pixels_mut(&mut self, y: u32) -> &mut [[u8; 4]] {
        bytemuck::cast_slice_mut(self.row_mut(y))
    }

    /// Read one pixel as `[b, g, r, a]`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = x as usize * 4;
        let row = self.row(y);
        [row[i], row[i + 1], row[i + 2], row[i + 3]]
    }

    /// Zero every byte, padding included.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Fill every pixel with one BGRA value.
    pub fn fill(&mut self, bgra: [u8; 4]) {
        for y in 0..self.height {
            self.pixels_mut(y).fill(bgra);
        }
    }
}
