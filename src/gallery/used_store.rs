//! Persistent "used" flags for gallery images
//!
//! The store keeps a `filename -> UsedRecord` map in memory and mirrors it
//! to a small JSON sidecar inside the managed folder:
//!
//! ```json
//! { "version": 1, "used": { "12.jpg": { "marked_at": "2026-10-17T09:30:00+00:00" } } }
//! ```
//!
//! Every write goes to `<sidecar>.tmp` first and is then renamed over the
//! sidecar, so readers only ever see a complete document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::Result;
use crate::utils::utc_now_iso;

/// Sidecar document version written by this store
pub const SIDECAR_VERSION: u32 = 1;

/// Metadata stored for a file marked as used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsedRecord {
    pub marked_at: String,
}

impl UsedRecord {
    /// Lenient read of one stored record; anything odd keeps the flag
    /// with an empty timestamp
    fn from_stored(value: &Value) -> Self {
        Self {
            marked_at: value
                .get("marked_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SidecarDocument<'a> {
    version: u32,
    used: &'a BTreeMap<String, UsedRecord>,
}

/// On-disk shape as read back: only the keys of `used` must be well formed
#[derive(Debug, Deserialize)]
struct StoredSidecar {
    #[serde(default)]
    used: BTreeMap<String, Value>,
}

/// Name-keyed used flags backed by an atomically written JSON file
#[derive(Debug)]
pub struct UsedStore {
    path: PathBuf,
    used: BTreeMap<String, UsedRecord>,
    load_error: Option<String>,
    generation: u64,
}

impl UsedStore {
    /// Open the store at `path`
    ///
    /// Never fails: a missing sidecar starts an empty store, and an
    /// unreadable or malformed one is logged and replaced by an empty map
    /// (the broken file is left untouched until the next write).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (used, load_error) = match Self::load(&path) {
            Ok(used) => (used, None),
            Err(e) => {
                warn!(
                    "Ignoring unreadable used file {}: {} (starting empty)",
                    path.display(),
                    e
                );
                (BTreeMap::new(), Some(e.to_string()))
            }
        };
        debug!("Loaded {} used entries from {}", used.len(), path.display());

        Self {
            path,
            used,
            load_error,
            generation: 0,
        }
    }

    fn load(path: &Path) -> Result<BTreeMap<String, UsedRecord>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(path)?;
        let document: StoredSidecar = serde_json::from_str(&contents)?;
        Ok(document
            .used
            .iter()
            .map(|(name, record)| (name.clone(), UsedRecord::from_stored(record)))
            .collect())
    }

    /// Path of the sidecar file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Why the sidecar could not be loaded at startup, if it could not
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Number of completed writes performed by this store instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn is_used(&self, filename: &str) -> bool {
        self.used.contains_key(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&UsedRecord> {
        self.used.get(filename)
    }

    /// Iterate over `(filename, record)` pairs in filename order
    pub fn records(&self) -> impl Iterator<Item = (&str, &UsedRecord)> {
        self.used.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// Set or clear the used flag of `filename`, then persist
    ///
    /// Marking refreshes `marked_at` even if the file was already used.
    /// Clearing an unknown name is not an error. The sidecar is rewritten
    /// in every case.
    pub fn mark(&mut self, filename: &str, used: bool) -> Result<()> {
        if used {
            self.used.insert(
                filename.to_string(),
                UsedRecord {
                    marked_at: utc_now_iso(),
                },
            );
        } else {
            self.used.remove(filename);
        }
        self.save()
    }

    /// Move used flags along with renamed files
    ///
    /// Pairs are applied one at a time, in order. A pair whose source is not
    /// used (or which does not rename anything) is skipped. If the
    /// destination is already used, the source entry is dropped and the
    /// destination keeps its own record. The sidecar is written once at the
    /// end, and only if something changed; the return value says whether it
    /// was.
    pub fn apply_renames<'a, I>(&mut self, renames: I) -> Result<bool>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut updated = false;
        for (old, new) in renames {
            if old == new {
                continue;
            }
            let Some(record) = self.used.remove(old) else {
                continue;
            };
            if self.used.contains_key(new) {
                debug!("Dropping used flag of {}: {} is already used", old, new);
            } else {
                debug!("Moving used flag {} -> {}", old, new);
                self.used.insert(new.to_string(), record);
            }
            updated = true;
        }

        if updated {
            self.save()?;
        }
        Ok(updated)
    }

    /// Write the full mapping atomically (temp file + rename)
    fn save(&mut self) -> Result<()> {
        let document = SidecarDocument {
            version: SIDECAR_VERSION,
            used: &self.used,
        };
        let mut json = serde_json::to_string_pretty(&document)?;
        json.push('\n');

        let temp_path = temp_path_for(&self.path);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        self.generation += 1;
        debug!(
            "Saved {} used entries to {}",
            self.used.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Staging path beside the sidecar: `.cover-used.json` -> `.cover-used.json.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
