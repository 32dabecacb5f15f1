//! Archive extraction
//!
//! Evaluation bundles arrive from IPFS as tar, tar.gz or zip blobs. Format
//! is detected from magic bytes, never from the CID. Extraction refuses
//! entries that would escape the destination directory.

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};

/// Supported archive container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

/// Sniff the container format from the first bytes of the blob
pub fn detect_format(bytes: &[u8]) -> Option<ArchiveFormat> {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        return Some(ArchiveFormat::TarGz);
    }
    if bytes.len() >= 4 && bytes[0] == b'P' && bytes[1] == b'K' {
        return Some(ArchiveFormat::Zip);
    }
    // ustar magic sits at offset 257 of the first tar header block
    if bytes.len() >= 262 && &bytes[257..262] == b"ustar" {
        return Some(ArchiveFormat::Tar);
    }
    None
}

/// Extract an archive blob into `dest`
pub fn extract(bytes: &[u8], dest: &Path) -> AdapterResult<()> {
    let format = detect_format(bytes).ok_or_else(|| {
        AdapterError::ArchiveCorrupt("unrecognized archive format (not tar/tar.gz/zip)".into())
    })?;
    debug!(?format, dest = %dest.display(), bytes = bytes.len(), "extracting archive");

    match format {
        ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(Cursor::new(bytes)), dest),
        ArchiveFormat::Tar => unpack_tar(Cursor::new(bytes), dest),
        ArchiveFormat::Zip => unpack_zip(bytes, dest),
    }
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> AdapterResult<()> {
    let mut archive = tar::Archive::new(reader);
    // tar's unpack already rejects absolute paths and parent traversal
    archive
        .unpack(dest)
        .map_err(|e| AdapterError::ArchiveCorrupt(format!("tar extraction failed: {e}")))
}

fn unpack_zip(bytes: &[u8], dest: &Path) -> AdapterResult<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AdapterError::ArchiveCorrupt(format!("zip open failed: {e}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("zip entry {index}: {e}")))?;

        let relative = entry.enclosed_name().map(|p| p.to_path_buf()).ok_or_else(|| {
            AdapterError::ArchiveCorrupt(format!("zip entry {index} escapes archive root"))
        })?;
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| AdapterError::ArchiveCorrupt(format!("zip mkdir failed: {e}")))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AdapterError::ArchiveCorrupt(format!("zip mkdir failed: {e}")))?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("zip create file failed: {e}")))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("zip write failed: {e}")))?;
    }
    Ok(())
}

/// Build a tar.gz blob for tests elsewhere in the crate
#[cfg(test)]
pub(crate) fn build_tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
