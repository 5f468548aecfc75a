//! Pipeline stages for render-and-stitch.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ bitmap ──▶ composite ──▶ encode / scratch
//! (pdfium)    (RGBA)     (fold)        (JPEG on disk)
//! ```
//!
//! 1. [`render`]   : pdfium backend of the engine worker
//! 2. [`bitmap`]   : stride-aware BGRA → RGBA conversion of engine output
//! 3. [`composite`]: sizing policy, Lanczos resampling, vertical stacking
//!    and the left fold over the page sequence
//! 4. [`encode`]   : JPEG encode/decode with atomic overwrite
//! 5. [`scratch`]  : the on-disk fold: page files merged into
//!    `<base>.jpg` and deleted once merged

pub mod bitmap;
pub mod composite;
pub mod encode;
pub mod render;
pub mod scratch;

use crate::error::StitchError;
use bitmap::PageImage;

/// Where a page image goes once rendered.
///
/// Implementations run on the blocking pool, one page at a time and in
/// page order.
pub trait PageSink: Send + 'static {
    /// Fold `page` in and return the composite size afterwards.
    fn accept(&mut self, page: PageImage) -> Result<(u32, u32), StitchError>;
}
