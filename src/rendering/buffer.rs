use crate::core::Rect;
use thiserror::Error;
use tracing::{trace, warn};

pub const BYTES_PER_PIXEL: usize = 4;
pub const MAX_DIMENSION: i32 = 8192;
pub const MAX_BUFFER_BYTES: usize = 256 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid buffer dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("Buffer of {0} bytes exceeds the allocation limit")]
    TooLarge(usize),
    #[error("Source buffer holds {actual} bytes, expected at least {expected}")]
    SourceTooSmall { expected: usize, actual: usize },
}

/// Row stride in bytes for a BGRA row of `width` pixels, aligned to 4 bytes.
#[inline]
pub fn stride_for(width: i32) -> usize {
    let raw = width.max(0) as usize * BYTES_PER_PIXEL;
    (raw + 3) & !3
}

pub fn validate_dimensions(width: i32, height: i32) -> Result<usize, BufferError> {
    if width <= 0 || height <= 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(BufferError::InvalidDimensions { width, height });
    }
    let bytes = stride_for(width) * height as usize;
    if bytes > MAX_BUFFER_BYTES {
        return Err(BufferError::TooLarge(bytes));
    }
    Ok(bytes)
}

/// Owned BGRA copy of an engine paint buffer.
///
/// The engine hands over a borrowed buffer that is only valid for the
/// duration of the paint callback; anything that needs the pixels later
/// (popup compositing, screenshots without a GPU) copies them here.
#[derive(Debug, Clone, Default)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: i32,
    height: i32,
    stride: usize,
}

impl PixelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: i32, height: i32) -> Result<Self, BufferError> {
        let mut buffer = Self::new();
        buffer.resize(width, height)?;
        Ok(buffer)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Reallocates only when the dimensions change. Contents are zeroed on
    /// reallocation.
    pub fn resize(&mut self, width: i32, height: i32) -> Result<(), BufferError> {
        if width == self.width && height == self.height && !self.data.is_empty() {
            return Ok(());
        }
        let bytes = validate_dimensions(width, height)?;
        self.data = vec![0; bytes];
        self.width = width;
        self.height = height;
        self.stride = stride_for(width);
        trace!("Pixel buffer resized to {}x{}", width, height);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
        self.stride = 0;
    }

    /// Copies a full tightly packed BGRA frame.
    pub fn copy_full(&mut self, source: &[u8], width: i32, height: i32) -> Result<(), BufferError> {
        self.resize(width, height)?;
        let src_stride = width as usize * BYTES_PER_PIXEL;
        let expected = src_stride * height as usize;
        if source.len() < expected {
            return Err(BufferError::SourceTooSmall {
                expected,
                actual: source.len(),
            });
        }

        if src_stride == self.stride {
            self.data[..expected].copy_from_slice(&source[..expected]);
        } else {
            for row in 0..height as usize {
                let src = &source[row * src_stride..(row + 1) * src_stride];
                let dst_start = row * self.stride;
                self.data[dst_start..dst_start + src_stride].copy_from_slice(src);
            }
        }
        Ok(())
    }

    /// Copies only the dirty regions. An empty list means the whole frame
    /// changed. Rects outside the buffer are clipped; empty ones are skipped.
    pub fn copy_dirty_rects(
        &mut self,
        source: &[u8],
        width: i32,
        height: i32,
        dirty_rects: &[Rect],
    ) -> Result<(), BufferError> {
        let size_changed = width != self.width || height != self.height || self.data.is_empty();
        if dirty_rects.is_empty() || size_changed {
            return self.copy_full(source, width, height);
        }

        let src_stride = width as usize * BYTES_PER_PIXEL;
        let expected = src_stride * height as usize;
        if source.len() < expected {
            return Err(BufferError::SourceTooSmall {
                expected,
                actual: source.len(),
            });
        }

        let bounds = self.bounds();
        for rect in dirty_rects {
            let clipped = rect.intersection(&bounds);
            if clipped.is_empty() {
                if !rect.is_empty() {
                    warn!("Dirty rect {} lies outside the {}x{} buffer", rect, width, height);
                }
                continue;
            }

            let row_bytes = clipped.width as usize * BYTES_PER_PIXEL;
            let col_offset = clipped.x as usize * BYTES_PER_PIXEL;
            for row in clipped.y as usize..clipped.bottom() as usize {
                let src_start = row * src_stride + col_offset;
                let dst_start = row * self.stride + col_offset;
                self.data[dst_start..dst_start + row_bytes]
                    .copy_from_slice(&source[src_start..src_start + row_bytes]);
            }
        }
        Ok(())
    }

    /// BGRA pixel at (x, y), or `None` outside the buffer.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }
}
