use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use strum_macros::Display;

/// ISO-BMFF brands that identify HEIC content
const HEIC_BRANDS: [&[u8; 4]; 4] = [b"heic", b"heix", b"hevc", b"hevx"];

/// ISO-BMFF brands that identify generic HEIF content
const HEIF_BRANDS: [&[u8; 4]; 3] = [b"mif1", b"msf1", b"heif"];

/// Image format as detected from the leading bytes of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
    Heic,
    Heif,
    Unknown,
}

impl ImageFormat {
    /// Classify a buffer by its magic bytes, ignoring any file extension
    pub fn sniff(header: &[u8]) -> Self {
        if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return ImageFormat::Jpeg;
        }
        if header.starts_with(b"\x89PNG\r\n\x1a\n") {
            return ImageFormat::Png;
        }
        if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            return ImageFormat::Gif;
        }
        if header.starts_with(b"BM") {
            return ImageFormat::Bmp;
        }
        if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
            return ImageFormat::Webp;
        }
        if header.len() >= 12 && &header[4..8] == b"ftyp" {
            let brand = &header[8..12];
            if HEIC_BRANDS.iter().any(|b| b.as_slice() == brand) {
                return ImageFormat::Heic;
            }
            if HEIF_BRANDS.iter().any(|b| b.as_slice() == brand) {
                return ImageFormat::Heif;
            }
        }
        ImageFormat::Unknown
    }

    /// True for the HEIC/HEIF family that browsers usually cannot preview
    pub fn is_heif_family(&self) -> bool {
        matches!(self, ImageFormat::Heic | ImageFormat::Heif)
    }

    /// MIME type for this format, falling back to the file extension
    /// (lowercase, with leading dot) when the format is unknown
    pub fn content_type(&self, ext: &str) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Heic => "image/heic",
            ImageFormat::Heif => "image/heif",
            ImageFormat::Unknown => content_type_for_extension(ext),
        }
    }
}

/// Extension based MIME lookup
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".webp" => "image/webp",
        ".heif" => "image/heif",
        ".heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Read up to `limit` leading bytes of a file
pub fn read_header(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Sniff a file on disk; unreadable files are reported as `Unknown`
pub fn sniff_file(path: &Path, limit: usize) -> ImageFormat {
    match read_header(path, limit) {
        Ok(header) => ImageFormat::sniff(&header),
        Err(e) => {
            tracing::debug!("Could not read header of {}: {}", path.display(), e);
            ImageFormat::Unknown
        }
    }
}
