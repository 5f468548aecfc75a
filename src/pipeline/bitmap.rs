//! Engine bitmaps and the page images derived from them.
//!
//! pdfium hands back BGRA rows that may be padded past `width * 4`. The
//! conversion here walks the buffer row by row using the stride, copies the
//! visible pixels in RGBA order and drops the padding, so everything
//! downstream works on a plain row-major [`RgbaImage`].

use crate::error::RenderError;
use image::RgbaImage;
use std::fmt;

const BYTES_PER_PIXEL: usize = 4;

/// One page as rasterised by the engine.
#[derive(Clone, PartialEq, Eq)]
pub struct RawBitmap {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, `>= width * 4`.
    pub stride: usize,
    /// BGRA bytes, `stride` per row.
    pub pixels: Vec<u8>,
    /// Whether the alpha channel carries information. When false the
    /// fourth byte is undefined and the page is treated as opaque.
    pub has_alpha: bool,
}

impl fmt::Debug for RawBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("pixels", &format_args!("<{} bytes>", self.pixels.len()))
            .field("has_alpha", &self.has_alpha)
            .finish()
    }
}

impl RawBitmap {
    /// Smallest buffer that holds every visible pixel. The last row does
    /// not need its padding.
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + self.width as usize * BYTES_PER_PIXEL
    }

    /// Reorder the BGRA buffer into a tightly packed RGBA image.
    pub fn to_rgba(&self) -> Result<RgbaImage, RenderError> {
        if self.width == 0 || self.height == 0 || self.stride == 0 {
            return Err(RenderError::BufferTooSmall {
                expected: BYTES_PER_PIXEL,
                actual: self.pixels.len(),
            });
        }
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        if self.stride < row_bytes || self.pixels.len() < self.required_len() {
            return Err(RenderError::BufferTooSmall {
                expected: self.required_len().max(row_bytes * self.height as usize),
                actual: self.pixels.len(),
            });
        }

        let mut rgba = Vec::with_capacity(row_bytes * self.height as usize);
        for row in self.pixels.chunks(self.stride).take(self.height as usize) {
            for bgra in row[..row_bytes].chunks_exact(BYTES_PER_PIXEL) {
                let alpha = if self.has_alpha { bgra[3] } else { u8::MAX };
                rgba.extend_from_slice(&[bgra[2], bgra[1], bgra[0], alpha]);
            }
        }

        let expected = rgba.capacity();
        let actual = rgba.len();
        RgbaImage::from_raw(self.width, self.height, rgba)
            .ok_or(RenderError::BufferTooSmall { expected, actual })
    }
}

/// A rendered page in canonical RGBA layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 0-based page index within the document.
    pub index: usize,
    pub image: RgbaImage,
}

impl PageImage {
    /// Convert an engine bitmap. The bitmap is consumed so its buffer is
    /// released as soon as the copy is done.
    pub fn from_raw(index: usize, raw: RawBitmap) -> Result<Self, RenderError> {
        if raw.width == 0 || raw.height == 0 {
            return Err(RenderError::NullBitmap { page: index });
        }
        let image = raw.to_rgba()?;
        Ok(Self { index, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}
