//! PDF rasterisation with pdfium.
//!
//! Everything in this module runs on the engine worker thread (see
//! [`crate::engine`]). `pdfium-render` ties every document to the `Pdfium`
//! instance that loaded it, so the worker creates `Pdfium` on its own stack
//! and lends it to [`PdfiumBackend`] for the lifetime of the serve loop.
//! When the loop ends the backend drops its documents first and `Pdfium`
//! tears the library down afterwards.

use crate::engine::{
    self, CommandReceiver, DocumentId, PageSize, RasterBackend, ReadySender, RenderTarget,
};
use crate::error::{DocumentOpenError, EngineError, RenderError};
use crate::pipeline::bitmap::RawBitmap;
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an existing pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// [`RasterBackend`] over a bound pdfium library.
pub struct PdfiumBackend<'a> {
    pdfium: &'a Pdfium,
    documents: HashMap<DocumentId, PdfDocument<'a>>,
}

impl<'a> PdfiumBackend<'a> {
    pub fn new(pdfium: &'a Pdfium) -> Self {
        Self {
            pdfium,
            documents: HashMap::new(),
        }
    }

    fn document(&self, id: DocumentId) -> Result<&PdfDocument<'a>, RenderError> {
        self.documents
            .get(&id)
            .ok_or(RenderError::EngineUnavailable)
    }

    fn page(&self, id: DocumentId, index: usize) -> Result<PdfPage<'_>, RenderError> {
        self.document(id)?
            .pages()
            .get(index as u16)
            .map_err(|e| RenderError::Engine {
                page: index,
                detail: format!("{:?}", e),
            })
    }
}

impl RasterBackend for PdfiumBackend<'_> {
    fn open_document(
        &mut self,
        id: DocumentId,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> Result<usize, DocumentOpenError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, password)
            .map_err(open_error)?;
        let count = document.pages().len() as usize;
        self.documents.insert(id, document);
        Ok(count)
    }

    fn page_count(&mut self, id: DocumentId) -> Result<usize, RenderError> {
        Ok(self.document(id)?.pages().len() as usize)
    }

    fn page_size(&mut self, id: DocumentId, index: usize) -> Result<PageSize, RenderError> {
        let page = self.page(id, index)?;
        Ok(PageSize {
            width_pt: page.width().value,
            height_pt: page.height().value,
        })
    }

    fn render_page(
        &mut self,
        id: DocumentId,
        index: usize,
        target: RenderTarget,
    ) -> Result<RawBitmap, RenderError> {
        let page = self.page(id, index)?;
        let has_alpha = page.has_transparency();
        let background = if has_alpha {
            PdfColor::new(0, 0, 0, 0)
        } else {
            PdfColor::WHITE
        };

        let render_config = PdfRenderConfig::new()
            .set_target_width(target.width as i32)
            .set_target_height(target.height as i32)
            .set_format(PdfBitmapFormat::BGRA)
            .set_clear_color(background)
            .render_annotations(true)
            .render_form_data(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Engine {
                page: index,
                detail: format!("{:?}", e),
            })?;

        let width = bitmap.width().max(0) as u32;
        let height = bitmap.height().max(0) as u32;
        let pixels = bitmap.as_raw_bytes();
        if width == 0 || height == 0 || pixels.is_empty() {
            return Err(RenderError::NullBitmap { page: index });
        }

        // pdfium pads rows to its own stride; the buffer holds exactly
        // `height` of them.
        let stride = pixels.len() / height as usize;

        Ok(RawBitmap {
            width,
            height,
            stride,
            pixels,
            has_alpha,
        })
    }

    fn close_document(&mut self, id: DocumentId) {
        if self.documents.remove(&id).is_some() {
            debug!("Closed document {}", id);
        }
    }
}

/// Map a failed load onto [`DocumentOpenError`].
///
/// pdfium's own failures carry an `FPDF_ERR_*` code as their discriminant.
/// Errors raised by the binding layer have no code and are reported as
/// unexpected, with their debug text.
fn open_error(error: PdfiumError) -> DocumentOpenError {
    match error {
        PdfiumError::PdfiumLibraryInternalError(internal) => {
            DocumentOpenError::from_code(internal as u32)
        }
        other => DocumentOpenError::from_engine_detail(&format!("{:?}", other)),
    }
}

/// Bind to a pdfium library.
///
/// Resolution order: `explicit`, `PDFIUM_LIB_PATH`, the working directory,
/// the system library path.
pub fn bind_pdfium(
    explicit: Option<&Path>,
) -> Result<Box<dyn PdfiumLibraryBindings>, EngineError> {
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

    if let Some(path) = configured {
        info!("Binding pdfium from {}", path.display());
        return Pdfium::bind_to_library(&path)
            .map_err(|e| EngineError::Bind(format!("{}: {:?}", path.display(), e)));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| EngineError::Bind(format!("{:?}", e)))
}

/// Body of the pdfium worker thread.
pub(crate) fn run_pdfium_worker(
    library: Option<PathBuf>,
    commands: CommandReceiver,
    ready: ReadySender,
) {
    let bindings = match bind_pdfium(library.as_deref()) {
        Ok(bindings) => bindings,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let pdfium = Pdfium::new(bindings);
    let mut backend = PdfiumBackend::new(&pdfium);
    let _ = ready.send(Ok(()));

    engine::serve(&mut backend, commands);
    drop(backend);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_map_through_their_code() {
        let cases = [
            (PdfiumInternalError::Unknown, DocumentOpenError::UnknownError),
            (PdfiumInternalError::FileError, DocumentOpenError::FileUnreadable),
            (PdfiumInternalError::FormatError, DocumentOpenError::FormatInvalid),
            (PdfiumInternalError::PasswordError, DocumentOpenError::PasswordRequired),
            (PdfiumInternalError::SecurityError, DocumentOpenError::EncryptionInvalid),
            (PdfiumInternalError::PageError, DocumentOpenError::PageInvalid),
        ];
        for (internal, expected) in cases {
            assert_eq!(
                open_error(PdfiumError::PdfiumLibraryInternalError(internal)),
                expected
            );
        }
    }

    #[test]
    fn binding_errors_fall_back_to_detail() {
        let err = open_error(PdfiumError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk gone",
        )));
        assert!(
            matches!(err, DocumentOpenError::UnexpectedError(ref d) if d.contains("IoError")),
            "got: {err:?}"
        );
    }
}
