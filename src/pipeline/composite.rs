//! Width matching, resampling and vertical stacking of page images.
//!
//! The composite is built as a strict left fold: the accumulator starts as
//! the first page and each later page is folded in with [`fold`]. Every
//! step resamples the whole accumulator again, so data movement grows
//! roughly quadratically with the page count. Long documents are better
//! served by a lower `max_width`, which keeps the accumulator narrow.

use crate::error::{ResampleError, StitchError};
use crate::pipeline::bitmap::PageImage;
use crate::pipeline::PageSink;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default width cap of the sizing policy, in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 600;

/// Resampling filter used for every resize.
pub const FILTER: FilterType = FilterType::Lanczos3;

/// Decides the common width two images are scaled to before stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePolicy {
    pub max_width: u32,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WIDTH)
    }
}

impl SizePolicy {
    pub const fn new(max_width: u32) -> Self {
        Self { max_width }
    }

    /// Target widths for an image pair `(a, b)`.
    ///
    /// * both wider than `max_width` → both become `max_width`
    /// * `a` is the narrower (or equal) one → `a` kept, `b` scaled to `a`
    /// * otherwise → `b` kept, `a` scaled to `b`
    ///
    /// The two returned widths are always equal.
    pub fn matched_widths(&self, a: u32, b: u32) -> (u32, u32) {
        let (wa, wb) = (f64::from(a), f64::from(b));
        let min = a.min(b);

        if min > self.max_width {
            let cap = f64::from(self.max_width);
            return (scaled(wa, cap / wa), scaled(wb, cap / wb));
        }

        if min == a {
            return (a, scaled(wb, wa / wb));
        }

        (scaled(wa, wb / wa), b)
    }
}

fn scaled(width: f64, ratio: f64) -> u32 {
    (width * ratio).round() as u32
}

/// Height that keeps the aspect ratio when `old_width` becomes `new_width`.
///
/// Rounds with a 0.7 bias, never below one row.
pub fn proportional_height(height: u32, old_width: u32, new_width: u32) -> u32 {
    let h = 0.7 + f64::from(height) * f64::from(new_width) / f64::from(old_width);
    (h as u32).max(1)
}

/// Resample `image` to `width`, deriving the height from the aspect ratio.
///
/// An image that already has the requested width is returned untouched.
pub fn resize_to_width(image: RgbaImage, width: u32) -> Result<RgbaImage, ResampleError> {
    if width == 0 {
        return Err(ResampleError::ZeroWidth);
    }
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(ResampleError::EmptyImage {
            width: w,
            height: h,
        });
    }
    if w == width {
        return Ok(image);
    }

    let height = proportional_height(h, w, width);
    Ok(imageops::resize(&image, width, height, FILTER))
}

/// Place `bottom` directly under `top` on a new canvas.
pub fn stack_vertically(top: &RgbaImage, bottom: &RgbaImage) -> Result<RgbaImage, ResampleError> {
    if top.width() != bottom.width() {
        return Err(ResampleError::WidthMismatch {
            top: top.width(),
            bottom: bottom.width(),
        });
    }

    let mut canvas = RgbaImage::new(top.width(), top.height() + bottom.height());
    imageops::replace(&mut canvas, top, 0, 0);
    imageops::replace(&mut canvas, bottom, 0, i64::from(top.height()));
    Ok(canvas)
}

/// One fold step: match widths, resample both sides, stack `next` under
/// `composite`.
pub fn fold(
    composite: RgbaImage,
    next: RgbaImage,
    policy: &SizePolicy,
) -> Result<RgbaImage, ResampleError> {
    let (wa, wb) = policy.matched_widths(composite.width(), next.width());
    debug!(
        "Fold {}x{} + {}x{} → width {}",
        composite.width(),
        composite.height(),
        next.width(),
        next.height(),
        wa
    );

    let top = resize_to_width(composite, wa)?;
    let bottom = resize_to_width(next, wb)?;
    stack_vertically(&top, &bottom)
}

/// Running accumulator for the in-memory fold.
#[derive(Debug, Default)]
pub struct Compositor {
    policy: SizePolicy,
    composite: Option<RgbaImage>,
    pages: usize,
}

impl Compositor {
    pub fn new(policy: SizePolicy) -> Self {
        Self {
            policy,
            composite: None,
            pages: 0,
        }
    }

    /// Fold `page` into the composite and return the new dimensions.
    ///
    /// The first page becomes the composite as-is. If a fold fails the
    /// accumulator is lost along with it.
    pub fn push(&mut self, page: RgbaImage) -> Result<(u32, u32), ResampleError> {
        let composite = match self.composite.take() {
            None => page,
            Some(acc) => fold(acc, page, &self.policy)?,
        };
        let dims = composite.dimensions();
        self.composite = Some(composite);
        self.pages += 1;
        Ok(dims)
    }

    /// Number of pages folded so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.composite.as_ref().map(RgbaImage::dimensions)
    }

    pub fn finish(self) -> Option<RgbaImage> {
        self.composite
    }
}

impl PageSink for Compositor {
    fn accept(&mut self, page: PageImage) -> Result<(u32, u32), StitchError> {
        Ok(self.push(page.into_image())?)
    }
}
