//! HEIC/HEIF to JPEG conversion through an external converter script
//!
//! The conversion itself is delegated to a script living in the managed
//! folder. This module owns everything around it: validating the target,
//! parking mislabeled originals in `.originals/`, staging the converter
//! output, verifying it, committing it under its final name and keeping
//! the used flags in step.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use super::error::{GalleryError, Result};
use super::listing::file_name_of;
use super::sniff::{sniff_file, ImageFormat};
use super::used_store::UsedStore;
use crate::utils::{has_image_extension, has_jpeg_extension, resolve_name, unique_path};

/// Backup folder for pre-conversion originals and staged outputs
pub const ORIGINALS_DIR: &str = ".originals";

/// Default converter script, looked up inside the managed folder
pub const DEFAULT_CONVERTER_SCRIPT: &str = "convert_heic_to_jpg.ps1";

/// Default interpreter used to run the converter script
pub const DEFAULT_CONVERTER_SHELL: &str = "powershell";

/// Bytes read when sniffing a conversion candidate or its output
const CONVERT_SNIFF_BYTES: usize = 64;

/// Something that can turn a HEIC/HEIF file into a JPEG file
pub trait ImageConverter: Send + Sync {
    /// Fail early when the converter cannot run at all
    fn ensure_available(&self, folder: &Path) -> Result<()>;

    /// Write a JPEG version of `input` to `output`
    fn convert(&self, folder: &Path, input: &Path, output: &Path) -> Result<()>;
}

/// Runs `<shell> [shell args] <folder>/<script> -InputPath <in> -OutputPath <out>`
///
/// A zero exit status means success; otherwise the combined stdout and
/// stderr of the script become the error message. No timeout is applied.
#[derive(Debug, Clone)]
pub struct ScriptConverter {
    shell: String,
    shell_args: Vec<String>,
    script_name: String,
}

impl ScriptConverter {
    /// Build a converter for `script_name` run by `shell`
    ///
    /// PowerShell hosts get `-ExecutionPolicy Bypass -File`, other shells
    /// receive the script path as their first argument.
    pub fn new(shell: impl Into<String>, script_name: impl Into<String>) -> Self {
        let shell = shell.into();
        let shell_args = if is_powershell(&shell) {
            vec![
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-File".to_string(),
            ]
        } else {
            Vec::new()
        };

        Self {
            shell,
            shell_args,
            script_name: script_name.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    fn script_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.script_name)
    }
}

impl Default for ScriptConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER_SHELL, DEFAULT_CONVERTER_SCRIPT)
    }
}

fn is_powershell(shell: &str) -> bool {
    let program = Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell)
        .to_lowercase();
    program == "powershell" || program == "pwsh"
}

impl ImageConverter for ScriptConverter {
    fn ensure_available(&self, folder: &Path) -> Result<()> {
        if self.script_path(folder).is_file() {
            Ok(())
        } else {
            Err(GalleryError::Processing(format!(
                "{} not found",
                self.script_name
            )))
        }
    }

    fn convert(&self, folder: &Path, input: &Path, output: &Path) -> Result<()> {
        let script = self.script_path(folder);
        debug!(
            "Running {} {} for {} -> {}",
            self.shell,
            script.display(),
            input.display(),
            output.display()
        );

        let result = Command::new(&self.shell)
            .args(&self.shell_args)
            .arg(&script)
            .arg("-InputPath")
            .arg(input)
            .arg("-OutputPath")
            .arg(output)
            .output()
            .map_err(|e| GalleryError::Processing(format!("failed to run {}: {}", self.shell, e)))?;

        if !result.status.success() {
            let stdout = String::from_utf8_lossy(&result.stdout);
            let stderr = String::from_utf8_lossy(&result.stderr);
            let message = format!("{}\n{}", stdout, stderr).trim().to_string();
            return Err(GalleryError::Processing(if message.is_empty() {
                "conversion failed".to_string()
            } else {
                message
            }));
        }
        Ok(())
    }
}

/// Result of a successful conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertOutcome {
    pub ok: bool,
    /// Path the converter read from (the parked original, or the file in place)
    pub input_moved_or_used: String,
    pub output_name: String,
    pub detected: ImageFormat,
}

/// An original that was moved into the backup folder before conversion
struct ParkedOriginal {
    parked_at: PathBuf,
    restore_to: PathBuf,
}

impl ParkedOriginal {
    /// Put the original back where it was; failures are only logged
    fn restore(&self) {
        if self.restore_to.exists() || !self.parked_at.exists() {
            warn!(
                "Not restoring {}: original location is occupied or backup is gone",
                self.parked_at.display()
            );
            return;
        }
        match fs::rename(&self.parked_at, &self.restore_to) {
            Ok(()) => info!("Restored original {}", self.restore_to.display()),
            Err(e) => warn!(
                "Failed to restore {} to {}: {} (original stays in backup folder)",
                self.parked_at.display(),
                self.restore_to.display(),
                e
            ),
        }
    }
}

/// Convert a HEIC/HEIF image (possibly mislabeled as `.jpg`) to a real JPEG
///
/// - `x.heic` is converted to `x.jpg` next to it and its used flag follows
///   the new name.
/// - A mislabeled `x.jpg` is parked as `.originals/x.heic` and the JPEG is
///   written back under the visible name, so its used flag is unchanged.
///
/// If anything fails after the original was parked, it is moved back
/// (best effort).
pub fn convert_heic_to_jpg(
    folder: &Path,
    store: &mut UsedStore,
    converter: &dyn ImageConverter,
    name: &str,
) -> Result<ConvertOutcome> {
    let file_path = resolve_name(folder, name)?;
    if !file_path.is_file() {
        return Err(GalleryError::NotFound);
    }
    if !has_image_extension(&file_path) {
        return Err(GalleryError::InvalidInput("not an image".to_string()));
    }

    let detected = sniff_file(&file_path, CONVERT_SNIFF_BYTES);
    if !detected.is_heif_family() {
        return Err(GalleryError::InvalidInput(format!(
            "not heic/heif (detected: {})",
            detected
        )));
    }

    converter.ensure_available(folder)?;

    let originals_dir = folder.join(ORIGINALS_DIR);
    fs::create_dir_all(&originals_dir)?;

    let base = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let final_output = folder.join(format!("{}.jpg", base));
    let staged_output = unique_path(&originals_dir, &format!("{}.converted.jpg", base))?;

    let parked = if has_jpeg_extension(&file_path) {
        let corrected_ext = if detected == ImageFormat::Heic { "heic" } else { "heif" };
        let parked_at = unique_path(&originals_dir, &format!("{}.{}", base, corrected_ext))?;
        fs::rename(&file_path, &parked_at)?;
        debug!("Parked {} at {}", file_path.display(), parked_at.display());
        Some(ParkedOriginal {
            parked_at,
            restore_to: file_path.clone(),
        })
    } else {
        None
    };
    let input_path = parked
        .as_ref()
        .map(|p| p.parked_at.clone())
        .unwrap_or_else(|| file_path.clone());

    let committed = converter
        .convert(folder, &input_path, &staged_output)
        .and_then(|()| verify_jpeg(&staged_output))
        .and_then(|()| fs::rename(&staged_output, &final_output).map_err(GalleryError::from));

    if let Err(e) = committed {
        warn!("Conversion of {} failed: {}", name, e);
        if staged_output.exists() {
            if let Err(cleanup) = fs::remove_file(&staged_output) {
                debug!("Could not remove {}: {}", staged_output.display(), cleanup);
            }
        }
        if let Some(parked) = &parked {
            parked.restore();
        }
        return Err(e);
    }

    let output_name = file_name_of(&final_output);
    // A `.jpg`/`.jpeg` name keeps its flag where it is
    if parked.is_none() {
        store.apply_renames([(name, output_name.as_str())])?;
    }

    info!("Converted {} ({}) -> {}", name, detected, output_name);

    Ok(ConvertOutcome {
        ok: true,
        input_moved_or_used: input_path.display().to_string(),
        output_name,
        detected,
    })
}

/// Check that the staged converter output really is a decodable JPEG
fn verify_jpeg(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(GalleryError::Processing(
            "converter did not produce an output file".to_string(),
        ));
    }
    let format = sniff_file(path, CONVERT_SNIFF_BYTES);
    if format != ImageFormat::Jpeg {
        return Err(GalleryError::Processing(format!(
            "converter output is not a JPEG (detected: {})",
            format
        )));
    }
    image::image_dimensions(path).map_err(|e| {
        GalleryError::Processing(format!("converter output could not be decoded: {}", e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const HEIC: &[u8] = b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00heic-payload";
    const HEIF: &[u8] = b"\x00\x00\x00\x18ftypmif1\x00\x00\x00\x00heif-payload";
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    enum Behaviour {
        WriteJpeg,
        WriteGarbage,
        Fail(&'static str),
        /// Writes a file where the parked original came from, then fails
        OccupyThenFail,
        Unavailable,
    }

    /// In-process stand-in for the converter script
    struct FakeConverter {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeConverter {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ImageConverter for FakeConverter {
        fn ensure_available(&self, _folder: &Path) -> Result<()> {
            match self.behaviour {
                Behaviour::Unavailable => Err(GalleryError::Processing(
                    "convert_heic_to_jpg.ps1 not found".to_string(),
                )),
                _ => Ok(()),
            }
        }

        fn convert(&self, folder: &Path, input: &Path, output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(input.is_file(), "converter input must exist: {}", input.display());
            match self.behaviour {
                Behaviour::WriteJpeg => {
                    image::RgbImage::new(4, 4)
                        .save_with_format(output, image::ImageFormat::Jpeg)
                        .map_err(|e| GalleryError::Processing(e.to_string()))?;
                    Ok(())
                }
                Behaviour::WriteGarbage => {
                    fs::write(output, b"definitely not a jpeg")?;
                    Ok(())
                }
                Behaviour::Fail(message) => Err(GalleryError::Processing(message.to_string())),
                Behaviour::OccupyThenFail => {
                    fs::write(folder.join("img.jpg"), b"someone else")?;
                    Err(GalleryError::Processing("converter crashed".to_string()))
                }
                Behaviour::Unavailable => unreachable!("availability is checked first"),
            }
        }
    }

    fn setup(files: &[(&str, &[u8])]) -> (TempDir, UsedStore) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let store = UsedStore::open(dir.path().join(".cover-used.json"));
        (dir, store)
    }

    fn is_jpeg(path: &Path) -> bool {
        sniff_file(path, 64) == ImageFormat::Jpeg
    }

    #[test]
    fn test_mislabeled_jpg_is_converted_in_place() {
        let (dir, mut store) = setup(&[("img.jpg", HEIC)]);
        store.mark("img.jpg", true).unwrap();
        let writes_before = store.generation();
        let converter = FakeConverter::new(Behaviour::WriteJpeg);

        let outcome = convert_heic_to_jpg(dir.path(), &mut store, &converter, "img.jpg").unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.output_name, "img.jpg");
        assert_eq!(outcome.detected, ImageFormat::Heic);
        let parked = dir.path().join(ORIGINALS_DIR).join("img.heic");
        assert_eq!(outcome.input_moved_or_used, parked.display().to_string());

        assert!(is_jpeg(&dir.path().join("img.jpg")));
        assert_eq!(fs::read(&parked).unwrap(), HEIC);
        assert!(!dir.path().join(ORIGINALS_DIR).join("img.converted.jpg").exists());

        // Same visible name: flag untouched, no extra sidecar write
        assert!(store.is_used("img.jpg"));
        assert_eq!(store.generation(), writes_before);
    }

    #[test]
    fn test_heic_extension_converts_and_remaps() {
        let (dir, mut store) = setup(&[("shot.heic", HEIC)]);
        store.mark("shot.heic", true).unwrap();
        let converter = FakeConverter::new(Behaviour::WriteJpeg);

        let outcome = convert_heic_to_jpg(dir.path(), &mut store, &converter, "shot.heic").unwrap();

        assert_eq!(outcome.output_name, "shot.jpg");
        assert_eq!(
            outcome.input_moved_or_used,
            dir.path().join("shot.heic").display().to_string()
        );
        assert!(is_jpeg(&dir.path().join("shot.jpg")));
        // Original stays in place for a non-jpg name
        assert!(dir.path().join("shot.heic").exists());

        assert!(store.is_used("shot.jpg"));
        assert!(!store.is_used("shot.heic"));
    }

    #[test]
    fn test_mislabeled_jpeg_keeps_its_flag() {
        for name in ["pic.JPEG", "pic.jpeg", "pic.JPG"] {
            let (dir, mut store) = setup(&[(name, HEIF)]);
            store.mark(name, true).unwrap();
            let writes_before = store.generation();
            let converter = FakeConverter::new(Behaviour::WriteJpeg);

            let outcome = convert_heic_to_jpg(dir.path(), &mut store, &converter, name).unwrap();

            assert_eq!(outcome.output_name, "pic.jpg");
            assert_eq!(outcome.detected, ImageFormat::Heif);
            assert!(dir.path().join(ORIGINALS_DIR).join("pic.heif").exists());
            // No remap for a name that already claims JPEG
            assert!(store.is_used(name), "{}", name);
            assert!(!store.is_used("pic.jpg"), "{}", name);
            assert_eq!(store.generation(), writes_before, "{}", name);
        }
    }

    #[test]
    fn test_backup_names_are_uniquified() {
        let (dir, mut store) = setup(&[("img.jpg", HEIC)]);
        fs::create_dir(dir.path().join(ORIGINALS_DIR)).unwrap();
        fs::write(dir.path().join(ORIGINALS_DIR).join("img.heic"), b"older").unwrap();
        let converter = FakeConverter::new(Behaviour::WriteJpeg);

        let outcome = convert_heic_to_jpg(dir.path(), &mut store, &converter, "img.jpg").unwrap();

        let parked = dir.path().join(ORIGINALS_DIR).join("img.1.heic");
        assert_eq!(outcome.input_moved_or_used, parked.display().to_string());
        assert_eq!(fs::read(dir.path().join(ORIGINALS_DIR).join("img.heic")).unwrap(), b"older");
    }

    #[test]
    fn test_failure_restores_original() {
        let (dir, mut store) = setup(&[("img.jpg", HEIC)]);
        store.mark("img.jpg", true).unwrap();
        let converter = FakeConverter::new(Behaviour::Fail("codec missing"));

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "img.jpg").unwrap_err();

        assert!(matches!(err, GalleryError::Processing(ref m) if m == "codec missing"));
        assert_eq!(fs::read(dir.path().join("img.jpg")).unwrap(), HEIC);
        assert!(!dir.path().join(ORIGINALS_DIR).join("img.heic").exists());
        assert!(store.is_used("img.jpg"));
    }

    #[test]
    fn test_rollback_refuses_occupied_original_location() {
        let (dir, mut store) = setup(&[("img.jpg", HEIC)]);
        store.mark("img.jpg", true).unwrap();
        let writes_before = store.generation();
        let converter = FakeConverter::new(Behaviour::OccupyThenFail);

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "img.jpg").unwrap_err();

        assert!(matches!(err, GalleryError::Processing(ref m) if m == "converter crashed"));
        // The newcomer is not overwritten and the original stays parked
        assert_eq!(fs::read(dir.path().join("img.jpg")).unwrap(), b"someone else");
        assert_eq!(
            fs::read(dir.path().join(ORIGINALS_DIR).join("img.heic")).unwrap(),
            HEIC
        );
        assert!(!dir.path().join(ORIGINALS_DIR).join("img.converted.jpg").exists());
        assert!(store.is_used("img.jpg"));
        assert_eq!(store.generation(), writes_before);
    }

    #[test]
    fn test_invalid_output_is_rejected_and_rolled_back() {
        let (dir, mut store) = setup(&[("img.jpg", HEIC)]);
        let converter = FakeConverter::new(Behaviour::WriteGarbage);

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "img.jpg").unwrap_err();

        assert_eq!(err.status(), 500);
        assert!(err.to_string().contains("not a JPEG"));
        assert_eq!(fs::read(dir.path().join("img.jpg")).unwrap(), HEIC);
        assert!(!dir.path().join(ORIGINALS_DIR).join("img.converted.jpg").exists());
    }

    #[test]
    fn test_unavailable_converter_touches_nothing() {
        let (dir, mut store) = setup(&[("img.jpg", HEIC)]);
        let converter = FakeConverter::new(Behaviour::Unavailable);

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "img.jpg").unwrap_err();

        assert_eq!(err.to_string(), "convert_heic_to_jpg.ps1 not found");
        assert!(dir.path().join("img.jpg").exists());
        assert!(!dir.path().join(ORIGINALS_DIR).exists());
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_bad_targets() {
        let (dir, mut store) = setup(&[
            ("real.jpg", JPEG_HEADER),
            ("notes.txt", HEIC),
        ]);
        let converter = FakeConverter::new(Behaviour::WriteJpeg);

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "missing.heic").unwrap_err();
        assert!(matches!(err, GalleryError::NotFound));

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "../real.jpg").unwrap_err();
        assert!(matches!(err, GalleryError::InvalidName));

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "notes.txt").unwrap_err();
        assert_eq!(err.to_string(), "not an image");

        let err = convert_heic_to_jpg(dir.path(), &mut store, &converter, "real.jpg").unwrap_err();
        assert_eq!(err.to_string(), "not heic/heif (detected: jpeg)");
        assert_eq!(err.status(), 400);

        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_script_converter_setup() {
        let converter = ScriptConverter::default();
        assert_eq!(converter.shell(), "powershell");
        assert_eq!(converter.script_name(), DEFAULT_CONVERTER_SCRIPT);
        assert_eq!(converter.shell_args, vec!["-ExecutionPolicy", "Bypass", "-File"]);

        assert!(ScriptConverter::new("pwsh", "x.ps1").shell_args.len() == 3);
        assert!(ScriptConverter::new("sh", "x.sh").shell_args.is_empty());

        let dir = TempDir::new().unwrap();
        let err = converter.ensure_available(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "convert_heic_to_jpg.ps1 not found");

        fs::write(dir.path().join(DEFAULT_CONVERTER_SCRIPT), b"# script").unwrap();
        assert!(converter.ensure_available(dir.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_script_converter_reports_script_output() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("convert.sh"),
            "echo \"cannot decode $2\"\necho 'from stderr' >&2\nexit 3\n",
        )
        .unwrap();
        let converter = ScriptConverter::new("sh", "convert.sh");

        let err = converter
            .convert(dir.path(), Path::new("in.heic"), Path::new("out.jpg"))
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot decode in.heic\n\nfrom stderr");
    }

    #[cfg(unix)]
    #[test]
    fn test_script_converter_passes_paths() {
        let dir = TempDir::new().unwrap();
        // $1 -InputPath, $2 input, $3 -OutputPath, $4 output
        fs::write(
            dir.path().join("convert.sh"),
            "[ \"$1\" = -InputPath ] && [ \"$3\" = -OutputPath ] && cp \"$2\" \"$4\"\n",
        )
        .unwrap();
        let input = dir.path().join("in.heic");
        let output = dir.path().join("out.jpg");
        fs::write(&input, HEIC).unwrap();

        ScriptConverter::new("sh", "convert.sh")
            .convert(dir.path(), &input, &output)
            .unwrap();
        assert_eq!(fs::read(&output).unwrap(), HEIC);
    }

    #[test]
    fn test_missing_shell_is_a_processing_error() {
        let dir = TempDir::new().unwrap();
        let converter = ScriptConverter::new("definitely-not-a-shell-4711", "x.ps1");
        let err = converter
            .convert(dir.path(), Path::new("a"), Path::new("b"))
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to run definitely-not-a-shell-4711"));
    }
}
