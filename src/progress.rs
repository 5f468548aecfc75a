//! Progress-callback trait for per-page stitching events.
//!
//! Inject an [`Arc<dyn StitchProgressCallback>`] via
//! [`crate::config::StitchConfigBuilder::progress_callback`] to receive
//! events as pages are rendered and folded into the composite.
//!
//! # Example
//!
//! ```rust
//! use pdfstitch::{StitchConfig, StitchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     merged: AtomicUsize,
//! }
//!
//! impl StitchProgressCallback for CountingCallback {
//!     fn on_page_merged(&self, page_num: usize, total: usize, width: u32, height: u32) {
//!         self.merged.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total} merged → {width}x{height}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { merged: AtomicUsize::new(0) });
//! let config = StitchConfig::builder()
//!     .progress_callback(cb as Arc<dyn StitchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the stitching pipeline as it processes each page.
///
/// Pages are rendered ahead concurrently but reported in page order, since
/// the fold consumes them sequentially. All methods default to no-ops.
pub trait StitchProgressCallback: Send + Sync {
    /// Called once after the document is opened.
    ///
    /// # Arguments
    /// * `total_pages`: number of selected pages that will be stitched
    fn on_stitch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page has been rasterised and converted to RGBA.
    ///
    /// `page_num` is 1-indexed; `width`/`height` are the rendered pixels.
    fn on_page_rendered(&self, page_num: usize, total_pages: usize, width: u32, height: u32) {
        let _ = (page_num, total_pages, width, height);
    }

    /// Called when a page has been folded into the composite.
    ///
    /// `width`/`height` are the composite's dimensions after the fold.
    fn on_page_merged(&self, page_num: usize, total_pages: usize, width: u32, height: u32) {
        let _ = (page_num, total_pages, width, height);
    }

    /// Called once after the last page is merged.
    fn on_stitch_complete(&self, total_pages: usize, width: u32, height: u32) {
        let _ = (total_pages, width, height);
    }
}

/// Convenience alias for the shared callback handle stored in the config.
pub type ProgressCallback = Arc<dyn StitchProgressCallback>;

/// A callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressCallback;

impl StitchProgressCallback for NoopProgressCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl StitchProgressCallback for Recorder {
        fn on_page_merged(&self, page_num: usize, _total: usize, w: u32, h: u32) {
            self.events.lock().unwrap().push(format!("{page_num}:{w}x{h}"));
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stitch_start(3);
        cb.on_page_rendered(1, 3, 10, 10);
        cb.on_page_merged(1, 3, 10, 10);
        cb.on_stitch_complete(3, 10, 30);
    }

    #[test]
    fn overridden_method_receives_events() {
        let rec = Arc::new(Recorder::default());
        let cb: ProgressCallback = rec.clone();
        cb.on_page_rendered(1, 2, 5, 5);
        cb.on_page_merged(2, 2, 600, 1700);
        assert_eq!(*rec.events.lock().unwrap(), vec!["2:600x1700".to_string()]);
    }
}
