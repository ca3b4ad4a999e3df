use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;

use super::error::Result;
use super::sniff::{sniff_file, ImageFormat};
use super::used_store::UsedStore;
use crate::utils::{dotted_extension, has_image_extension};

/// Bytes read from each file when listing
const LIST_SNIFF_BYTES: usize = 32;

/// View model of one image in the managed folder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub name: String,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch
    pub mtime: f64,
    /// Lowercase extension with leading dot
    pub ext: String,
    pub detected_format: ImageFormat,
    pub used: bool,
    pub browser_maybe_unsupported: bool,
}

/// Discover image files directly inside `folder`
///
/// Only regular files (symlinks are followed) with a supported extension
/// are returned, sorted case-insensitively by file name.
pub fn discover_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false);

    let mut images = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("failed to read directory entry"))
        })?;
        let path = entry.path();
        if path.is_file() && has_image_extension(path) {
            images.push(path.to_path_buf());
        }
    }

    images.sort_by_key(|path| file_name_of(path).to_lowercase());
    Ok(images)
}

/// File name of a discovered path as an owned string
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Build the image list shown by the gallery
pub fn list_images(folder: &Path, store: &UsedStore, only_unused: bool) -> Result<Vec<ImageInfo>> {
    let mut items = Vec::new();

    for path in discover_images(folder)? {
        let name = file_name_of(&path);
        let used = store.is_used(&name);
        if only_unused && used {
            continue;
        }

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                // Vanished between the scan and the stat
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let detected_format = sniff_file(&path, LIST_SNIFF_BYTES);
        items.push(ImageInfo {
            name,
            size: metadata.len(),
            mtime,
            ext: dotted_extension(&path),
            detected_format,
            used,
            browser_maybe_unsupported: detected_format.is_heif_family(),
        });
    }

    debug!("Listed {} images in {}", items.len(), folder.display());
    Ok(items)
}
