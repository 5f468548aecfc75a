//! Serialised access to the PDF engine.
//!
//! pdfium is process-global and not thread-safe. Instead of a lock around
//! every call, one dedicated worker thread owns the engine and every open
//! document; callers send it [`Command`]s over a channel and await the
//! reply on a oneshot. The resulting [`EngineHandle`] is `Clone + Send +
//! Sync` and can be used from any task.
//!
//! ```text
//!  task ─┐                      ┌──────────────────────────┐
//!  task ─┼─ Command ──▶ mpsc ──▶│ worker: RasterBackend    │
//!  task ─┘   ◀── oneshot reply ─│  (pdfium + documents)    │
//!                               └──────────────────────────┘
//! ```
//!
//! Only rasterisation happens on the worker. The BGRA → RGBA copy runs on
//! the blocking pool so the engine is free for the next page meanwhile.
//!
//! The worker is generic over [`RasterBackend`]; [`Engine::init_pdfium`]
//! runs it with pdfium and [`Engine::with_backend`] with anything else.

use crate::error::{DocumentOpenError, EngineError, RenderError, StitchError};
use crate::pipeline::bitmap::{PageImage, RawBitmap};
use crate::pipeline::render;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Identifies an open document inside the worker.
pub type DocumentId = u64;

/// Set while a pdfium-backed engine is alive.
static PDFIUM_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Page dimensions in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Pixel dimensions at `dpi`: `points * dpi / 72`, rounded, at least 1.
    pub fn pixels_at(&self, dpi: u32) -> RenderTarget {
        let scale = f64::from(dpi) / 72.0;
        let px = |pt: f32| ((f64::from(pt) * scale).round() as u32).max(1);
        RenderTarget {
            width: px(self.width_pt),
            height: px(self.height_pt),
        }
    }
}

/// Pixel size of the surface a page is rendered onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
}

/// The operations the worker needs from a rasterising engine.
///
/// Calls are never concurrent: the worker owns the backend and handles one
/// command at a time, so implementations need not be thread-safe.
pub trait RasterBackend {
    /// Load `bytes` under `id` and return its page count. The backend keeps
    /// `bytes` alive for as long as the document is open.
    fn open_document(
        &mut self,
        id: DocumentId,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> Result<usize, DocumentOpenError>;

    fn page_count(&mut self, id: DocumentId) -> Result<usize, RenderError>;

    fn page_size(&mut self, id: DocumentId, index: usize) -> Result<PageSize, RenderError>;

    /// Rasterise page `index` onto a `target`-sized surface pre-filled with
    /// opaque white, or transparent when the page declares transparency,
    /// including annotations. Page and surface are released before
    /// returning, on success and on error.
    fn render_page(
        &mut self,
        id: DocumentId,
        index: usize,
        target: RenderTarget,
    ) -> Result<RawBitmap, RenderError>;

    fn close_document(&mut self, id: DocumentId);
}

pub(crate) enum Command {
    Open {
        id: DocumentId,
        bytes: Vec<u8>,
        password: Option<String>,
        reply: oneshot::Sender<Result<usize, DocumentOpenError>>,
    },
    PageSize {
        id: DocumentId,
        index: usize,
        reply: oneshot::Sender<Result<PageSize, RenderError>>,
    },
    Render {
        id: DocumentId,
        index: usize,
        dpi: u32,
        reply: oneshot::Sender<Result<RawBitmap, RenderError>>,
    },
    Close {
        id: DocumentId,
        reply: Option<oneshot::Sender<()>>,
    },
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Open { .. } => "Open",
            Command::PageSize { .. } => "PageSize",
            Command::Render { .. } => "Render",
            Command::Close { .. } => "Close",
            Command::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

pub(crate) type CommandReceiver = mpsc::UnboundedReceiver<Command>;
pub(crate) type ReadySender = std_mpsc::SyncSender<Result<(), EngineError>>;

/// Worker loop: execute commands until shutdown or every handle is gone.
pub(crate) fn serve<B: RasterBackend>(backend: &mut B, mut commands: CommandReceiver) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Open {
                id,
                bytes,
                password,
                reply,
            } => {
                let _ = reply.send(backend.open_document(id, bytes, password.as_deref()));
            }
            Command::PageSize { id, index, reply } => {
                let size = checked_page(backend, id, index).and_then(|()| backend.page_size(id, index));
                let _ = reply.send(size);
            }
            Command::Render {
                id,
                index,
                dpi,
                reply,
            } => {
                let _ = reply.send(render_on_worker(backend, id, index, dpi));
            }
            Command::Close { id, reply } => {
                backend.close_document(id);
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            Command::Shutdown => break,
        }
    }
    debug!("Engine worker stopping");
}

fn checked_page<B: RasterBackend>(
    backend: &mut B,
    id: DocumentId,
    index: usize,
) -> Result<(), RenderError> {
    let total = backend.page_count(id)?;
    if index >= total {
        return Err(RenderError::PageOutOfRange { page: index, total });
    }
    Ok(())
}

fn render_on_worker<B: RasterBackend>(
    backend: &mut B,
    id: DocumentId,
    index: usize,
    dpi: u32,
) -> Result<RawBitmap, RenderError> {
    if dpi == 0 {
        return Err(RenderError::InvalidDpi { dpi });
    }
    checked_page(backend, id, index)?;
    let target = backend.page_size(id, index)?.pixels_at(dpi);
    let bitmap = backend.render_page(id, index, target)?;
    debug!(
        "Rendered page {} → {}x{} px (stride {})",
        index + 1,
        bitmap.width,
        bitmap.height,
        bitmap.stride
    );
    Ok(bitmap)
}

// ── Engine ───────────────────────────────────────────────────────────────

/// Owner of the engine worker thread.
///
/// Create one per process with [`Engine::init_pdfium`], hand out
/// [`EngineHandle`]s, and call [`Engine::shutdown`] once all work is done.
/// Dropping the engine shuts it down as well.
#[derive(Debug)]
pub struct Engine {
    handle: EngineHandle,
    worker: Option<JoinHandle<()>>,
    owns_pdfium: bool,
}

impl Engine {
    /// Bind pdfium and start the worker.
    ///
    /// The library is looked up at `PDFIUM_LIB_PATH`, then in the working
    /// directory, then on the system library path. Blocks while binding.
    pub fn init_pdfium() -> Result<Self, EngineError> {
        Self::init_pdfium_from(None)
    }

    /// Like [`Engine::init_pdfium`] with an explicit library path.
    pub fn init_pdfium_at(library: impl Into<PathBuf>) -> Result<Self, EngineError> {
        Self::init_pdfium_from(Some(library.into()))
    }

    fn init_pdfium_from(library: Option<PathBuf>) -> Result<Self, EngineError> {
        if PDFIUM_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyInitialised);
        }

        let started = Self::spawn(true, move |commands, ready| {
            render::run_pdfium_worker(library, commands, ready)
        });
        if started.is_err() {
            PDFIUM_ACTIVE.store(false, Ordering::SeqCst);
        } else {
            info!("PDF engine initialised");
        }
        started
    }

    /// Start a worker around a custom backend.
    ///
    /// `factory` runs on the worker thread, so the backend itself does not
    /// have to be `Send`.
    pub fn with_backend<B, F>(factory: F) -> Result<Self, EngineError>
    where
        B: RasterBackend,
        F: FnOnce() -> Result<B, EngineError> + Send + 'static,
    {
        Self::spawn(false, move |commands, ready| {
            let mut backend = match factory() {
                Ok(backend) => backend,
                Err(e) => {
                    let _ = ready.send(Err(e));
                    return;
                }
            };
            let _ = ready.send(Ok(()));
            serve(&mut backend, commands);
        })
    }

    fn spawn<F>(owns_pdfium: bool, body: F) -> Result<Self, EngineError>
    where
        F: FnOnce(CommandReceiver, ReadySender) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let worker = std::thread::Builder::new()
            .name("pdfstitch-engine".into())
            .spawn(move || body(rx, ready_tx))
            .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                handle: EngineHandle {
                    commands: tx,
                    next_id: Arc::new(AtomicU64::new(1)),
                },
                worker: Some(worker),
                owns_pdfium,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(EngineError::WorkerPanicked)
            }
        }
    }

    /// A cloneable handle for submitting work.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Close remaining documents, tear the engine down and join the worker.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.handle.commands.send(Command::Shutdown);
        let joined = worker.join().map_err(|_| EngineError::WorkerPanicked);
        if self.owns_pdfium {
            PDFIUM_ACTIVE.store(false, Ordering::SeqCst);
            info!("PDF engine shut down");
        }
        joined
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Engine shutdown failed: {}", e);
        }
    }
}

// ── Handles and documents ────────────────────────────────────────────────

/// Cheap, cloneable access to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Open a PDF held in memory. The document owns `bytes` until closed.
    pub async fn open(
        &self,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> Result<Document, StitchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Open {
                id,
                bytes,
                password: password.map(str::to_string),
                reply,
            })
            .map_err(|_| EngineError::Unavailable)?;

        let page_count = rx.await.map_err(|_| EngineError::Unavailable)??;
        info!("PDF loaded: {} pages", page_count);

        Ok(Document {
            id,
            engine: self.clone(),
            page_count,
            closed: false,
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, RenderError>>) -> Command,
    ) -> Result<T, RenderError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| RenderError::EngineUnavailable)?;
        rx.await.map_err(|_| RenderError::EngineUnavailable)?
    }
}

/// An open document. Closed on the worker when dropped.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    engine: EngineHandle,
    page_count: usize,
    closed: bool,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    fn check_index(&self, index: usize) -> Result<(), RenderError> {
        if index >= self.page_count {
            return Err(RenderError::PageOutOfRange {
                page: index,
                total: self.page_count,
            });
        }
        Ok(())
    }

    /// Native size of page `index` in points.
    pub async fn page_size(&self, index: usize) -> Result<PageSize, RenderError> {
        self.check_index(index)?;
        let id = self.id;
        self.engine
            .request(|reply| Command::PageSize { id, index, reply })
            .await
    }

    /// Rasterise page `index` and return the engine's BGRA bitmap.
    pub async fn render_raw(&self, index: usize, dpi: u32) -> Result<RawBitmap, RenderError> {
        if dpi == 0 {
            return Err(RenderError::InvalidDpi { dpi });
        }
        self.check_index(index)?;
        let id = self.id;
        self.engine
            .request(|reply| Command::Render {
                id,
                index,
                dpi,
                reply,
            })
            .await
    }

    /// Rasterise page `index` at `dpi` into an RGBA page image.
    ///
    /// The pixel conversion runs on the blocking pool, outside the engine.
    pub async fn render_page(&self, index: usize, dpi: u32) -> Result<PageImage, RenderError> {
        let raw = self.render_raw(index, dpi).await?;
        tokio::task::spawn_blocking(move || PageImage::from_raw(index, raw))
            .await
            .map_err(|_| RenderError::ConversionPanicked { page: index })?
    }

    /// Close the document and wait until the engine has released it.
    pub async fn close(mut self) {
        self.closed = true;
        let (reply, rx) = oneshot::channel();
        if self
            .engine
            .commands
            .send(Command::Close {
                id: self.id,
                reply: Some(reply),
            })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.engine.commands.send(Command::Close {
                id: self.id,
                reply: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_follow_points_times_dpi_over_72() {
        let a4 = PageSize {
            width_pt: 595.0,
            height_pt: 842.0,
        };
        assert_eq!(
            a4.pixels_at(600),
            RenderTarget {
                width: 4958,
                height: 7017
            }
        );
        assert_eq!(
            a4.pixels_at(72),
            RenderTarget {
                width: 595,
                height: 842
            }
        );
        let small = PageSize {
            width_pt: 300.0,
            height_pt: 400.0,
        };
        assert_eq!(
            small.pixels_at(600),
            RenderTarget {
                width: 2500,
                height: 3333
            }
        );
    }

    #[test]
    fn tiny_pages_get_at_least_one_pixel() {
        let dot = PageSize {
            width_pt: 0.1,
            height_pt: 0.1,
        };
        assert_eq!(dot.pixels_at(1), RenderTarget { width: 1, height: 1 });
    }
}
