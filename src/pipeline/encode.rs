//! JPEG encode/decode for page and composite files.
//!
//! JPEG has no alpha channel, so images are flattened to RGB before
//! encoding. Writes go through a temp file in the destination directory and
//! are renamed into place, which overwrites any previous output atomically
//! and never leaves a half-written JPEG behind.

use crate::error::StitchError;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageReader, RgbImage, RgbaImage};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Quality the `image` crate's JPEG encoder uses when none is given.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Encode `image` as JPEG at `quality` and atomically replace `path`.
pub fn write_jpeg(image: &RgbaImage, path: &Path, quality: u8) -> Result<(), StitchError> {
    let write_failed = |source: std::io::Error| StitchError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir).map_err(write_failed)?;

    let rgb: RgbImage = image.convert();
    {
        let mut writer = BufWriter::new(tmp.as_file());
        JpegEncoder::new_with_quality(&mut writer, quality)
            .encode_image(&rgb)
            .map_err(|source| StitchError::ImageEncode {
                path: path.to_path_buf(),
                source,
            })?;
        writer.flush().map_err(write_failed)?;
    }

    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    debug!(
        "Wrote {}x{} JPEG (q={}) → {}",
        image.width(),
        image.height(),
        quality,
        path.display()
    );
    Ok(())
}

/// Decode an image file, sniffing the format from its content.
pub fn read_image(path: &Path) -> Result<RgbaImage, StitchError> {
    let decode_failed = |source: ImageError| StitchError::ImageDecode {
        path: path.to_path_buf(),
        source,
    };

    let image = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| decode_failed(ImageError::IoError(e)))?
        .decode()
        .map_err(decode_failed)?;

    Ok(image.into_rgba8())
}
