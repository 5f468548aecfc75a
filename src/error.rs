//! Error types for the pdfstitch library.
//!
//! Errors are grouped by the stage that raises them:
//!
//! * [`DocumentOpenError`]: the engine refused the PDF. Aborts the whole
//!   document before any page is rendered.
//! * [`RenderError`]: a single page could not be rasterised or its bitmap
//!   could not be converted. Fatal for the run: pages are never skipped.
//! * [`ResampleError`]: the composite builder was handed images it cannot
//!   scale or stack.
//! * [`EngineError`]: the engine worker itself could not be started, bound
//!   or reached.
//!
//! [`StitchError`] is the top-level type returned by every public entry
//! point and wraps all of the above. Decode failures of intermediate JPEG
//! files are ordinary `Err` values, so batch callers can keep going with the
//! next document.

use std::path::PathBuf;
use thiserror::Error;

/// Why the engine refused to open a document.
///
/// Mirrors the `FPDF_ERR_*` codes reported by pdfium after a failed load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentOpenError {
    #[error("unknown engine error while opening the document")]
    UnknownError,

    #[error("document could not be read")]
    FileUnreadable,

    #[error("document is not a PDF or is corrupted")]
    FormatInvalid,

    #[error("document is encrypted and the password is missing or wrong")]
    PasswordRequired,

    #[error("document uses an unsupported security handler")]
    EncryptionInvalid,

    #[error("document page tree is invalid")]
    PageInvalid,

    #[error("unexpected engine error while opening the document: {0}")]
    UnexpectedError(String),
}

impl DocumentOpenError {
    /// Translate a raw `FPDF_GetLastError` code.
    ///
    /// Code 0 means "success" and cannot accompany a failed load, so it is
    /// reported as unexpected along with any code pdfium may add later.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::UnknownError,
            2 => Self::FileUnreadable,
            3 => Self::FormatInvalid,
            4 => Self::PasswordRequired,
            5 => Self::EncryptionInvalid,
            6 => Self::PageInvalid,
            other => Self::UnexpectedError(format!("engine error code {other}")),
        }
    }

    /// Wrap a load failure that carries no engine code.
    pub fn from_engine_detail(detail: &str) -> Self {
        Self::UnexpectedError(detail.to_string())
    }
}

/// A page could not be turned into a [`crate::PageImage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// 0-based page index outside `[0, total)`.
    #[error("Page index {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("DPI must be greater than zero, got {dpi}")]
    InvalidDpi { dpi: u32 },

    /// The engine produced no pixels for the page.
    #[error("Engine returned an empty bitmap for page index {page}")]
    NullBitmap { page: usize },

    /// The pixel buffer cannot hold `height` rows of `stride` bytes.
    #[error("Bitmap buffer too small: need {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Rasterisation failed for page index {page}: {detail}")]
    Engine { page: usize, detail: String },

    #[error("Pixel conversion task for page index {page} panicked")]
    ConversionPanicked { page: usize },

    /// The engine worker has shut down or the document was closed.
    #[error("PDF engine is no longer available")]
    EngineUnavailable,
}

/// The composite builder could not scale or stack its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResampleError {
    #[error("Cannot resample to a width of zero")]
    ZeroWidth,

    #[error("Cannot resample an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error("Cannot stack images of different widths ({top} above {bottom})")]
    WidthMismatch { top: u32, bottom: u32 },
}

/// Failures of the engine worker itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// pdfium is process-global; only one live engine may own it.
    #[error("PDF engine is already initialised in this process")]
    AlreadyInitialised,

    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library in the working directory."
    )]
    Bind(String),

    #[error("Failed to start the engine worker thread: {0}")]
    WorkerSpawn(String),

    #[error("Engine worker thread panicked")]
    WorkerPanicked,

    #[error("PDF engine is no longer available")]
    Unavailable,
}

/// All fatal errors returned by the pdfstitch entry points.
#[derive(Debug, Error)]
pub enum StitchError {
    #[error("Failed to open PDF: {0}")]
    DocumentOpen(#[from] DocumentOpenError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Failed to merge page images: {0}")]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An intermediate image could not be read back.
    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image '{path}': {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The page selection matched no page of the document.
    #[error("Page selection matches no page (document has {total} pages)")]
    EmptySelection { total: usize },

    #[error("Stitching was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_codes_map_to_kinds() {
        assert_eq!(DocumentOpenError::from_code(1), DocumentOpenError::UnknownError);
        assert_eq!(DocumentOpenError::from_code(2), DocumentOpenError::FileUnreadable);
        assert_eq!(DocumentOpenError::from_code(3), DocumentOpenError::FormatInvalid);
        assert_eq!(DocumentOpenError::from_code(4), DocumentOpenError::PasswordRequired);
        assert_eq!(DocumentOpenError::from_code(5), DocumentOpenError::EncryptionInvalid);
        assert_eq!(DocumentOpenError::from_code(6), DocumentOpenError::PageInvalid);
    }

    #[test]
    fn success_and_unknown_codes_are_unexpected() {
        assert!(matches!(
            DocumentOpenError::from_code(0),
            DocumentOpenError::UnexpectedError(_)
        ));
        assert!(matches!(
            DocumentOpenError::from_code(42),
            DocumentOpenError::UnexpectedError(msg) if msg.contains("42")
        ));
    }

    #[test]
    fn engine_detail_is_kept_verbatim() {
        assert_eq!(
            DocumentOpenError::from_engine_detail("UnknownBitmapFormat"),
            DocumentOpenError::UnexpectedError("UnknownBitmapFormat".into())
        );
    }

    #[test]
    fn page_out_of_range_display() {
        let e = RenderError::PageOutOfRange { page: 7, total: 3 };
        let msg = e.to_string();
        assert!(msg.contains("7"), "got: {msg}");
        assert!(msg.contains("3 pages"), "got: {msg}");
    }

    #[test]
    fn open_error_wraps_into_stitch_error() {
        let e: StitchError = DocumentOpenError::PasswordRequired.into();
        assert!(e.to_string().contains("password"));
    }
}
