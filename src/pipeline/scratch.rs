//! The on-disk fold.
//!
//! The first page is encoded straight to `<base>.jpg`. Every later page is
//! encoded to `<base><index>.jpg`, merged into `<base>.jpg` with
//! [`merge_files`] and deleted again, so only the composite survives a
//! run. Each merge decodes the current composite from disk, which is what
//! keeps at most two full images in memory at a time.

use crate::error::StitchError;
use crate::pipeline::bitmap::PageImage;
use crate::pipeline::composite::{fold, SizePolicy};
use crate::pipeline::encode::{read_image, write_jpeg};
use crate::pipeline::PageSink;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File names derived from an output base such as `out/report`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    base: PathBuf,
}

impl ScratchPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `<base>.jpg`: the composite.
    pub fn output(&self) -> PathBuf {
        self.with_suffix("")
    }

    /// `<base><index>.jpg`: the scratch file of one page.
    pub fn page(&self, index: usize) -> PathBuf {
        self.with_suffix(&index.to_string())
    }

    // Appends rather than using `with_extension` so bases containing dots
    // keep their full name.
    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.base.as_os_str());
        name.push(suffix);
        name.push(".jpg");
        PathBuf::from(name)
    }
}

/// Merge the image at `overlay` under the image at `base` and write the
/// result to `output` as JPEG at `quality`.
///
/// `output` may be the same file as `base`. Returns the composite size.
pub fn merge_files(
    base: &Path,
    overlay: &Path,
    output: &Path,
    policy: &SizePolicy,
    quality: u8,
) -> Result<(u32, u32), StitchError> {
    let top = read_image(base)?;
    let bottom = read_image(overlay)?;
    let merged = fold(top, bottom, policy)?;
    write_jpeg(&merged, output, quality)?;
    Ok(merged.dimensions())
}

/// [`PageSink`] that folds through JPEG files on disk.
#[derive(Debug)]
pub struct ScratchStitcher {
    paths: ScratchPaths,
    policy: SizePolicy,
    page_quality: u8,
    merge_quality: u8,
    pages: usize,
}

impl ScratchStitcher {
    pub fn new(paths: ScratchPaths, policy: SizePolicy, page_quality: u8, merge_quality: u8) -> Self {
        Self {
            paths,
            policy,
            page_quality,
            merge_quality,
            pages: 0,
        }
    }

    pub fn output(&self) -> PathBuf {
        self.paths.output()
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Whether `<base>.jpg` has been written by this stitcher.
    pub fn wrote_output(&self) -> bool {
        self.pages > 0
    }
}

impl PageSink for ScratchStitcher {
    fn accept(&mut self, page: PageImage) -> Result<(u32, u32), StitchError> {
        let output = self.paths.output();

        if self.pages == 0 {
            write_jpeg(&page.image, &output, self.page_quality)?;
            self.pages = 1;
            return Ok(page.image.dimensions());
        }

        let scratch = self.paths.page(page.index);
        write_jpeg(&page.image, &scratch, self.page_quality)?;
        drop(page);

        let merged = merge_files(&output, &scratch, &output, &self.policy, self.merge_quality);
        remove_scratch(&scratch);

        let dims = merged?;
        self.pages += 1;
        debug!("Composite now {}x{} after {} pages", dims.0, dims.1, self.pages);
        Ok(dims)
    }
}

fn remove_scratch(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove scratch file {}: {}", path.display(), e);
        }
    }
}
