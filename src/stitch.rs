//! Render-and-stitch entry points.
//!
//! Every entry point runs the same driver: open the document on the engine,
//! render the selected pages ahead through an order-preserving buffered
//! stream, and hand them one at a time to a [`PageSink`] on the blocking
//! pool. The sink decides where the composite lives:
//!
//! * [`stitch`] / [`stitch_in_memory_to_file`] fold into a [`Compositor`]
//! * [`stitch_to_file`] folds through JPEG files on disk ([`ScratchStitcher`])
//!
//! Pages are folded strictly in page order, whatever order the engine
//! finishes them in.

use crate::config::StitchConfig;
use crate::engine::{EngineHandle, PageSize};
use crate::error::StitchError;
use crate::pipeline::composite::Compositor;
use crate::pipeline::encode::write_jpeg;
use crate::pipeline::scratch::{ScratchPaths, ScratchStitcher};
use crate::pipeline::PageSink;
use futures::stream::{self, StreamExt};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchStats {
    /// Pages in the source document.
    pub pages_in_document: usize,
    /// Pages folded into the composite.
    pub pages_stitched: usize,
    pub width: u32,
    pub height: u32,
    /// The written JPEG, when the run produced a file.
    pub output_path: Option<PathBuf>,
    pub total_duration_ms: u64,
}

/// Result of [`stitch`]: the composite plus run statistics.
#[derive(Debug, Clone)]
pub struct StitchOutput {
    pub image: RgbaImage,
    pub stats: StitchStats,
}

/// Page count and per-page size of a document, without rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    /// Point size of every page, in document order.
    pub pages: Vec<PageSize>,
}

struct Driven {
    pages_in_document: usize,
    pages_stitched: usize,
    dimensions: (u32, u32),
}

/// Render and fold the selected pages of `pdf` into `sink`.
///
/// The sink is lent to the blocking pool for each page and put back
/// afterwards, so the caller can still inspect it when the run fails.
async fn drive<S: PageSink>(
    engine: &EngineHandle,
    pdf: Vec<u8>,
    config: &StitchConfig,
    sink: &mut Option<S>,
) -> Result<Driven, StitchError> {
    if config.is_cancelled() {
        return Err(StitchError::Cancelled);
    }

    let document = engine.open(pdf, config.password.as_deref()).await?;
    let total = document.page_count();

    let indices = config.pages.to_indices(total);
    if indices.is_empty() {
        return Err(StitchError::EmptySelection { total });
    }
    let selected = indices.len();
    debug!("Selected {} of {} pages", selected, total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_stitch_start(selected);
    }

    let dpi = config.dpi;
    let mut stitched = 0usize;
    let mut dimensions = (0, 0);
    {
        let document = &document;
        let mut pages = std::pin::pin!(stream::iter(indices)
            .map(|index| async move {
                if config.is_cancelled() {
                    return Err(StitchError::Cancelled);
                }
                Ok(document.render_page(index, dpi).await?)
            })
            .buffered(config.concurrency.max(1)));

        while let Some(page) = pages.next().await {
            let page = page?;
            let page_num = page.index + 1;

            if let Some(ref cb) = config.progress_callback {
                cb.on_page_rendered(page_num, selected, page.width(), page.height());
            }
            if config.is_cancelled() {
                return Err(StitchError::Cancelled);
            }

            let mut current = sink
                .take()
                .ok_or_else(|| StitchError::Internal("page sink is gone".into()))?;
            let (returned, accepted) = tokio::task::spawn_blocking(move || {
                let accepted = current.accept(page);
                (current, accepted)
            })
            .await
            .map_err(|e| StitchError::Internal(format!("page sink panicked: {}", e)))?;
            *sink = Some(returned);
            dimensions = accepted?;
            stitched += 1;

            if let Some(ref cb) = config.progress_callback {
                cb.on_page_merged(page_num, selected, dimensions.0, dimensions.1);
            }
        }
    }
    document.close().await;

    if let Some(ref cb) = config.progress_callback {
        cb.on_stitch_complete(selected, dimensions.0, dimensions.1);
    }

    Ok(Driven {
        pages_in_document: total,
        pages_stitched: stitched,
        dimensions,
    })
}

fn stats_for(driven: &Driven, output_path: Option<PathBuf>, start: Instant) -> StitchStats {
    StitchStats {
        pages_in_document: driven.pages_in_document,
        pages_stitched: driven.pages_stitched,
        width: driven.dimensions.0,
        height: driven.dimensions.1,
        output_path,
        total_duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Render the selected pages and stack them into one image in memory.
pub async fn stitch(
    engine: &EngineHandle,
    pdf: Vec<u8>,
    config: &StitchConfig,
) -> Result<StitchOutput, StitchError> {
    let start = Instant::now();
    info!("Starting in-memory stitch ({} bytes)", pdf.len());

    let mut sink = Some(Compositor::new(config.size_policy()));
    let driven = drive(engine, pdf, config, &mut sink).await?;
    let stats = stats_for(&driven, None, start);
    let image = sink
        .and_then(Compositor::finish)
        .ok_or_else(|| StitchError::Internal("no page was folded".into()))?;

    info!(
        "Stitched {} pages into {}x{} in {}ms",
        stats.pages_stitched, stats.width, stats.height, stats.total_duration_ms
    );
    Ok(StitchOutput { image, stats })
}

/// Render the selected pages and fold them through scratch files into
/// `<output_base>.jpg`.
///
/// Each page after the first is written to `<output_base><index>.jpg`,
/// merged into the composite and deleted, so at most two full images are
/// held in memory at once. On failure the composite is removed if this run
/// had started writing it; an earlier `<output_base>.jpg` survives runs that
/// fail before their first page is written.
pub async fn stitch_to_file(
    engine: &EngineHandle,
    pdf: Vec<u8>,
    output_base: impl AsRef<Path>,
    config: &StitchConfig,
) -> Result<StitchStats, StitchError> {
    let start = Instant::now();
    let paths = ScratchPaths::new(output_base.as_ref());
    let output = paths.output();
    create_parent_dir(&output).await?;
    info!("Stitching into {}", output.display());

    let mut sink = Some(ScratchStitcher::new(
        paths,
        config.size_policy(),
        config.page_quality,
        config.merge_quality,
    ));

    let driven = match drive(engine, pdf, config, &mut sink).await {
        Ok(driven) => driven,
        Err(e) => {
            // A missing sink panicked mid-fold and may have touched the output.
            if sink.as_ref().map_or(true, ScratchStitcher::wrote_output) {
                remove_partial_output(&output).await;
            }
            return Err(e);
        }
    };

    let stats = stats_for(&driven, Some(output), start);
    info!(
        "Wrote {}x{} composite of {} pages in {}ms",
        stats.width, stats.height, stats.pages_stitched, stats.total_duration_ms
    );
    Ok(stats)
}

/// Fold in memory, then encode `<output_base>.jpg` once.
///
/// Trades memory for fewer JPEG generations than [`stitch_to_file`]. A
/// single page is encoded at `page_quality`, a composite at
/// `merge_quality`.
pub async fn stitch_in_memory_to_file(
    engine: &EngineHandle,
    pdf: Vec<u8>,
    output_base: impl AsRef<Path>,
    config: &StitchConfig,
) -> Result<StitchStats, StitchError> {
    let output = ScratchPaths::new(output_base.as_ref()).output();
    create_parent_dir(&output).await?;

    let StitchOutput { image, mut stats } = stitch(engine, pdf, config).await?;
    let quality = if stats.pages_stitched > 1 {
        config.merge_quality
    } else {
        config.page_quality
    };

    let target = output.clone();
    tokio::task::spawn_blocking(move || write_jpeg(&image, &target, quality))
        .await
        .map_err(|e| StitchError::Internal(format!("JPEG encode panicked: {}", e)))??;

    info!("Wrote {}", output.display());
    stats.output_path = Some(output);
    Ok(stats)
}

/// Synchronous wrapper around [`stitch`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// another runtime.
pub fn stitch_sync(
    engine: &EngineHandle,
    pdf: Vec<u8>,
    config: &StitchConfig,
) -> Result<StitchOutput, StitchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| StitchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(stitch(engine, pdf, config))
}

/// Open `pdf` and report its page sizes without rendering anything.
pub async fn inspect(
    engine: &EngineHandle,
    pdf: Vec<u8>,
    password: Option<&str>,
) -> Result<DocumentInfo, StitchError> {
    let document = engine.open(pdf, password).await?;
    let page_count = document.page_count();

    let mut pages = Vec::with_capacity(page_count);
    for index in 0..page_count {
        pages.push(document.page_size(index).await?);
    }
    document.close().await;

    Ok(DocumentInfo { page_count, pages })
}

async fn create_parent_dir(path: &Path) -> Result<(), StitchError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StitchError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        _ => Ok(()),
    }
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
