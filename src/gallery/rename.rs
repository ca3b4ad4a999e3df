use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use super::error::Result;
use super::listing::{discover_images, file_name_of};
use super::used_store::UsedStore;
use crate::utils::{is_simple_number_name, numeric_stem, original_extension};

/// Largest number considered when looking for the current maximum
const MAX_NUMBERED: u64 = 999_999;

/// One planned or performed rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameEntry {
    pub from: String,
    pub to: String,
}

/// Result of an auto-rename pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub max_num: u64,
    pub dry_run: bool,
    pub renamed: Vec<RenameEntry>,
    pub skipped: Vec<String>,
}

/// Renumber every image whose name is not already a plain number
///
/// Numbering continues after the highest existing numeric name (0 when
/// there is none). Each target is checked on disk right before use, so an
/// existing `{n}{ext}` is never overwritten. The original extension is
/// kept as written. With `dry_run` the same plan is computed but neither
/// the files nor the used store are touched.
pub fn auto_rename_images(
    folder: &Path,
    store: &mut UsedStore,
    dry_run: bool,
) -> Result<RenameReport> {
    rename_images_with(folder, store, dry_run, |from, to| fs::rename(from, to))
}

/// The rename pass with the file move supplied by the caller
fn rename_images_with<F>(
    folder: &Path,
    store: &mut UsedStore,
    dry_run: bool,
    mut move_file: F,
) -> Result<RenameReport>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    let images = discover_images(folder)?;

    let max_num = images
        .iter()
        .filter_map(|path| numeric_stem(path))
        .filter(|num| *num <= MAX_NUMBERED)
        .max()
        .unwrap_or(0);

    let mut next_num = max_num + 1;
    let mut renamed = Vec::new();
    let mut skipped = Vec::new();

    for path in &images {
        let name = file_name_of(path);
        if is_simple_number_name(path) {
            skipped.push(name);
            continue;
        }

        let ext = original_extension(path);
        while folder.join(format!("{}{}", next_num, ext)).exists() {
            next_num += 1;
        }
        let new_name = format!("{}{}", next_num, ext);

        if !dry_run {
            if let Err(e) = move_file(path, &folder.join(&new_name)) {
                // Keep the store in step with the files that did move
                remap_store(store, &renamed)?;
                return Err(e.into());
            }
        }
        if dry_run {
            debug!("Would rename {} -> {}", name, new_name);
        } else {
            debug!("Renamed {} -> {}", name, new_name);
        }

        renamed.push(RenameEntry {
            from: name,
            to: new_name,
        });
        next_num += 1;
    }

    if !dry_run {
        remap_store(store, &renamed)?;
    }

    info!(
        "Auto-rename in {}: {} renamed, {} skipped (max_num {}, dry_run {})",
        folder.display(),
        renamed.len(),
        skipped.len(),
        max_num,
        dry_run
    );

    Ok(RenameReport {
        max_num,
        dry_run,
        renamed,
        skipped,
    })
}

fn remap_store(store: &mut UsedStore, renamed: &[RenameEntry]) -> Result<bool> {
    store.apply_renames(
        renamed
            .iter()
            .map(|entry| (entry.from.as_str(), entry.to.as_str())),
    )
}
