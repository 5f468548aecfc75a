//! # pdfstitch
//!
//! Render every page of a PDF with pdfium and stitch the pages, top to
//! bottom, into one JPEG.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Open     load the document on the engine worker
//!  ├─ 2. Render   rasterise pages at `dpi` (BGRA, serialised on the worker)
//!  ├─ 3. Convert  BGRA → RGBA on the blocking pool
//!  ├─ 4. Fold     match widths, Lanczos-resample, stack vertically
//!  └─ 5. Output   `<base>.jpg` (scratch files merged and removed)
//! ```
//!
//! pdfium is not thread-safe, so all engine calls go through one worker
//! thread owned by an [`Engine`]. Pages are rendered ahead concurrently
//! while the fold itself stays sequential and in page order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfstitch::{stitch_to_file, Engine, StitchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::init_pdfium()?;
//!     let pdf = tokio::fs::read("document.pdf").await?;
//!
//!     let stats = stitch_to_file(&engine.handle(), pdf, "out/document", &StitchConfig::default()).await?;
//!     eprintln!("{} pages → {}x{}", stats.pages_stitched, stats.width, stats.height);
//!
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfstitch` binary (clap + anyhow + indicatif + tracing-subscriber + serde_json) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfstitch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod stitch;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CancelToken, PageSelection, StitchConfig, StitchConfigBuilder};
pub use engine::{Document, Engine, EngineHandle, PageSize, RasterBackend, RenderTarget};
pub use error::{DocumentOpenError, EngineError, RenderError, ResampleError, StitchError};
pub use pipeline::bitmap::{PageImage, RawBitmap};
pub use pipeline::composite::{fold, resize_to_width, stack_vertically, Compositor, SizePolicy};
pub use pipeline::scratch::{merge_files, ScratchPaths, ScratchStitcher};
pub use pipeline::PageSink;
pub use progress::{NoopProgressCallback, ProgressCallback, StitchProgressCallback};
pub use stitch::{
    inspect, stitch, stitch_in_memory_to_file, stitch_sync, stitch_to_file, DocumentInfo,
    StitchOutput, StitchStats,
};
