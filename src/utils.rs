use chrono::{SecondsFormat, Utc};
use std::path::{Component, Path, PathBuf};

use crate::gallery::{GalleryError, Result};

/// Image extensions managed by the gallery (lowercase, with leading dot)
pub const IMAGE_EXTENSIONS: [&str; 8] = [
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".heif", ".heic",
];

/// Extensions that claim JPEG content
pub const JPEG_EXTENSIONS: [&str; 2] = [".jpg", ".jpeg"];

/// Maximum number of `.N` suffixes tried when looking for a free name
const MAX_UNIQUE_ATTEMPTS: u32 = 10_000;

/// Get file extension in lowercase (without the dot)
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Lowercase extension with its leading dot, or an empty string
pub fn dotted_extension(path: &Path) -> String {
    get_file_extension(path)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Extension exactly as written in the filename (with dot), or empty
pub fn original_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Check if a file has one of the supported image extensions
pub fn has_image_extension(path: &Path) -> bool {
    IMAGE_EXTENSIONS.contains(&dotted_extension(path).as_str())
}

/// Check if a file name claims to be a JPEG
pub fn has_jpeg_extension(path: &Path) -> bool {
    JPEG_EXTENSIONS.contains(&dotted_extension(path).as_str())
}

/// Numeric value of a base name made only of ASCII digits
pub fn numeric_stem(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Absurdly long digit runs overflow; they are simply not numbered names
    stem.parse::<u64>().ok()
}

/// A "simple number" name has an all-digit base of at most 6 digits
pub fn is_simple_number_name(path: &Path) -> bool {
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => {
            !stem.is_empty() && stem.len() <= 6 && stem.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// True if `name` is a single, plain path component
pub fn is_bare_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Resolve a client supplied filename inside the managed folder
///
/// Only bare names are accepted: absolute paths, separators and `..`
/// are rejected so a request can never reach outside `folder`.
pub fn resolve_name(folder: &Path, name: &str) -> Result<PathBuf> {
    if !is_bare_name(name) {
        return Err(GalleryError::InvalidName);
    }
    Ok(folder.join(name))
}

/// Find a path in `dir` for `name` that does not exist yet
///
/// Collisions are resolved as `{stem}.{i}{ext}`, e.g. `a.heic`, `a.1.heic`.
pub fn unique_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let base = Path::new(name)
        .file_name()
        .ok_or_else(|| GalleryError::Processing(format!("invalid name: {}", name)))?;
    let candidate = dir.join(base);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = original_extension(&candidate);
    for i in 1..MAX_UNIQUE_ATTEMPTS {
        let candidate = dir.join(format!("{}.{}{}", stem, i, ext));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(GalleryError::Processing(
        "unable to find unique name".to_string(),
    ))
}

/// Current UTC time as ISO-8601 with second precision (`+00:00` offset)
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Format a byte count in a human-readable way
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
