//! Zip export of a captured frame set.
//!
//! Each frame is re-encoded as PNG and stored under a 1-based, zero-padded
//! name (`0001.png`, `0002.png`, ...) in capture order.

use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use image::ImageOutputFormat;
use log::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::capture::{CancellationToken, CapturedFrame};
use crate::{Result, ScrubberError};

/// Default file name for an exported archive
pub const ARCHIVE_FILE_NAME: &str = "image_frames.zip";

/// Archive entry name for a 1-based frame position
pub fn entry_name(position: usize) -> String {
    format!("{:04}.png", position)
}

fn encode_png(frame: &CapturedFrame) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    frame
        .image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .map_err(|source| ScrubberError::FrameEncoding {
            position: frame.position,
            source,
        })?;
    Ok(bytes)
}

/// Write every frame into a fresh zip archive on `writer`.
pub fn write_archive<W: Write + Seek>(frames: &[CapturedFrame], writer: W) -> Result<W> {
    write_frames(frames, writer, &CancellationToken::new())
}

fn write_frames<W: Write + Seek>(
    frames: &[CapturedFrame],
    writer: W,
    cancel: &CancellationToken,
) -> Result<W> {
    if frames.is_empty() {
        return Err(ScrubberError::NothingToExport);
    }

    // PNG data is already compressed
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(writer);

    for (offset, frame) in frames.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ScrubberError::Cancelled);
        }
        let name = entry_name(offset + 1);
        let png = encode_png(frame)?;
        debug!("Adding {} ({} bytes)", name, png.len());
        zip.start_file(name, options)?;
        zip.write_all(&png)?;
    }

    Ok(zip.finish()?)
}

/// Build the whole archive in memory
pub fn build_archive(frames: &[CapturedFrame]) -> Result<Vec<u8>> {
    let cursor = write_archive(frames, Cursor::new(Vec::new()))?;
    Ok(cursor.into_inner())
}

/// Export frames to `path`. Nothing is written unless every frame encoded
/// and `cancel` was never triggered.
///
/// When `path` is an existing directory the archive is placed inside it
/// as [`ARCHIVE_FILE_NAME`].
pub fn export_archive(
    frames: &[CapturedFrame],
    path: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let target = if path.is_dir() {
        path.join(ARCHIVE_FILE_NAME)
    } else {
        path.to_path_buf()
    };

    let bytes = write_frames(frames, Cursor::new(Vec::new()), cancel)?.into_inner();
    if cancel.is_cancelled() {
        debug!("Export to {} discarded", target.display());
        return Err(ScrubberError::Cancelled);
    }
    fs::write(&target, &bytes)?;

    info!(
        "Exported {} frames to {} ({} bytes)",
        frames.len(),
        target.display(),
        bytes.len()
    );
    Ok(target)
}
