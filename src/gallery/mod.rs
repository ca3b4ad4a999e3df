pub mod convert;
pub mod error;
pub mod listing;
pub mod rename;
pub mod sniff;
pub mod used_store;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub use convert::{ConvertOutcome, ImageConverter, ScriptConverter, ORIGINALS_DIR};
pub use error::{GalleryError, Result};
pub use listing::ImageInfo;
pub use rename::{RenameEntry, RenameReport};
pub use sniff::ImageFormat;
pub use used_store::{UsedRecord, UsedStore};

use crate::utils::{dotted_extension, has_image_extension, resolve_name};

/// Default name of the used sidecar file
pub const DEFAULT_USED_FILE: &str = ".cover-used.json";

/// Bytes sniffed before serving an image
const SERVE_SNIFF_BYTES: usize = 64;

/// An image read for serving, with the content type to announce
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub data: Vec<u8>,
    pub content_type: &'static str,
}

/// The managed folder together with its used store and converter
///
/// Every operation holds the store lock for its whole sequence of
/// filesystem changes and sidecar writes, so concurrent callers never
/// interleave a rename, a conversion and a mark.
pub struct Gallery {
    folder: PathBuf,
    store: Mutex<UsedStore>,
    converter: Box<dyn ImageConverter>,
}

impl Gallery {
    pub fn new(
        folder: impl Into<PathBuf>,
        store: UsedStore,
        converter: Box<dyn ImageConverter>,
    ) -> Self {
        Self {
            folder: folder.into(),
            store: Mutex::new(store),
            converter,
        }
    }

    /// Open `folder` with the sidecar `used_file` inside it
    pub fn open(
        folder: impl Into<PathBuf>,
        used_file: &str,
        converter: Box<dyn ImageConverter>,
    ) -> Self {
        let folder = folder.into();
        let store = UsedStore::open(folder.join(used_file));
        Self::new(folder, store, converter)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn lock(&self) -> MutexGuard<'_, UsedStore> {
        // A panic in another request leaves the map itself consistent
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the used store
    pub fn with_store<T>(&self, f: impl FnOnce(&mut UsedStore) -> T) -> T {
        f(&mut self.lock())
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.lock().is_used(name)
    }

    pub fn list_images(&self, only_unused: bool) -> Result<Vec<ImageInfo>> {
        let store = self.lock();
        listing::list_images(&self.folder, &store, only_unused)
    }

    /// Set the used flag of an existing image
    pub fn mark(&self, name: &str, used: bool) -> Result<()> {
        let mut store = self.lock();
        let path = self.existing_image(name)?;
        store.mark(name, used)?;
        info!(
            "{} {}",
            if used { "Marked used:" } else { "Marked unused:" },
            path.display()
        );
        Ok(())
    }

    pub fn rename_all(&self, dry_run: bool) -> Result<RenameReport> {
        let mut store = self.lock();
        rename::auto_rename_images(&self.folder, &mut store, dry_run)
    }

    pub fn convert(&self, name: &str) -> Result<ConvertOutcome> {
        let mut store = self.lock();
        convert::convert_heic_to_jpg(&self.folder, &mut store, self.converter.as_ref(), name)
    }

    /// Read an image for serving; the content type comes from its bytes
    pub fn read_image(&self, name: &str) -> Result<ImageBytes> {
        let _store = self.lock();
        let path = self.existing_image(name)?;
        let data = fs::read(&path)?;
        let head = &data[..data.len().min(SERVE_SNIFF_BYTES)];
        let content_type = ImageFormat::sniff(head).content_type(&dotted_extension(&path));
        Ok(ImageBytes { data, content_type })
    }

    /// Validate a client supplied name: bare name (400), exists (404),
    /// supported extension (403)
    fn existing_image(&self, name: &str) -> Result<PathBuf> {
        let path = resolve_name(&self.folder, name)?;
        if !path.is_file() {
            return Err(GalleryError::NotFound);
        }
        if !has_image_extension(&path) {
            return Err(GalleryError::Forbidden);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn gallery(dir: &TempDir) -> Gallery {
        Gallery::open(
            dir.path(),
            DEFAULT_USED_FILE,
            Box::new(ScriptConverter::default()),
        )
    }

    #[test]
    fn test_mark_validations() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let gallery = gallery(&dir);

        assert!(matches!(gallery.mark("../a.jpg", true), Err(GalleryError::InvalidName)));
        assert!(matches!(gallery.mark("b.jpg", true), Err(GalleryError::NotFound)));
        assert!(matches!(gallery.mark("notes.txt", true), Err(GalleryError::Forbidden)));

        gallery.mark("a.jpg", true).unwrap();
        assert!(gallery.is_used("a.jpg"));
        assert!(dir.path().join(DEFAULT_USED_FILE).exists());
    }

    #[test]
    fn test_read_image_content_type() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("real.png"), [0xFFu8, 0xD8, 0xFF, 0xE0, 1, 2]).unwrap();
        fs::write(dir.path().join("odd.webp"), b"????").unwrap();
        let gallery = gallery(&dir);

        // Bytes win over the extension
        let image = gallery.read_image("real.png").unwrap();
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.data.len(), 6);

        // Unknown bytes fall back to the extension
        assert_eq!(gallery.read_image("odd.webp").unwrap().content_type, "image/webp");
        assert!(matches!(gallery.read_image("nope.png"), Err(GalleryError::NotFound)));
    }

    #[test]
    fn test_listing_reflects_marks_and_renames() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cover.jpg"), b"x").unwrap();
        let gallery = gallery(&dir);
        gallery.mark("cover.jpg", true).unwrap();

        gallery.rename_all(false).unwrap();
        let all = gallery.list_images(false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "1.jpg");
        assert!(all[0].used);
        assert!(gallery.list_images(true).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_marks_are_all_persisted() {
        let dir = TempDir::new().unwrap();
        for i in 0..16 {
            fs::write(dir.path().join(format!("img{}.png", i)), b"x").unwrap();
        }
        let gallery = Arc::new(gallery(&dir));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gallery = Arc::clone(&gallery);
                thread::spawn(move || gallery.mark(&format!("img{}.png", i), true).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reloaded = UsedStore::open(dir.path().join(DEFAULT_USED_FILE));
        assert_eq!(reloaded.len(), 16);
        assert_eq!(gallery.with_store(|store| store.generation()), 16);
    }
}
