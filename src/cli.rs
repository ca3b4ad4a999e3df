use clap::Parser;
use std::path::PathBuf;

use crate::gallery::convert::{DEFAULT_CONVERTER_SCRIPT, DEFAULT_CONVERTER_SHELL};
use crate::gallery::{ScriptConverter, DEFAULT_USED_FILE};
use crate::server::ServerConfig;
use crate::utils::is_bare_name;

#[derive(Parser, Debug)]
#[command(
    name = "cover-gallery",
    version,
    about = "Local web gallery for picking cover images out of a folder",
    long_about = "
Cover Gallery

Serves a small web page listing the images in one folder so you can pick
covers from it. Images you mark as used disappear from the default view;
the flags are kept in a JSON sidecar file next to the images.

Features:
• Used/unused flags that follow files across renames
• Format sniffing (catches HEIC files saved as .jpg)
• Sequential renumbering of non-numeric filenames
• HEIC/HEIF to JPEG conversion through a helper script

Example Usage:
  # Serve the current folder on http://127.0.0.1:8765/
  cover-gallery

  # Serve another folder on a different port
  cover-gallery --dir ~/Pictures/covers --port 9000

  # Print the unused images and exit
  cover-gallery --dir ~/Pictures/covers --list --only-unused

  # Show what the renumbering would do without touching any file
  cover-gallery --dir ~/Pictures/covers --rename --dry-run

  # Use PowerShell 7 for the converter script
  cover-gallery --converter-shell pwsh"
)]
pub struct Args {
    /// Folder containing the images
    #[arg(short = 'd', long = "dir", default_value = ".", value_name = "DIR")]
    pub dir: PathBuf,

    /// Host name or address to listen on
    #[arg(long = "host", default_value = "127.0.0.1", value_name = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value = "8765", value_name = "PORT")]
    pub port: u16,

    /// Name of the used-flags sidecar file inside the folder
    #[arg(long = "used-file", default_value = DEFAULT_USED_FILE, value_name = "NAME")]
    pub used_file: String,

    /// Shell used to run the HEIC converter script
    #[arg(long = "converter-shell", default_value = DEFAULT_CONVERTER_SHELL, value_name = "SHELL")]
    pub converter_shell: String,

    /// Converter script name, looked up inside the folder
    #[arg(long = "converter-script", default_value = DEFAULT_CONVERTER_SCRIPT, value_name = "NAME")]
    pub converter_script: String,

    /// JSON configuration file; explicit flags take precedence over it
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Enable verbose output with per-file details
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Print the image list and exit
    #[arg(long = "list", conflicts_with = "rename")]
    pub list: bool,

    /// With --list: hide images marked as used
    #[arg(long = "only-unused", requires = "list")]
    pub only_unused: bool,

    /// Renumber non-numeric filenames and exit
    #[arg(long = "rename")]
    pub rename: bool,

    /// With --rename: only show the planned renames
    #[arg(long = "dry-run", requires = "rename")]
    pub dry_run: bool,
}

impl Args {
    /// Check the values that clap cannot check on its own
    pub fn validate(&self) -> Result<(), String> {
        if !self.dir.exists() {
            return Err(format!("Folder does not exist: {}", self.dir.display()));
        }
        if !self.dir.is_dir() {
            return Err(format!("Not a folder: {}", self.dir.display()));
        }
        if self.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }
        if !is_bare_name(&self.used_file) {
            return Err(format!(
                "Invalid used file name '{}'. Use a plain file name like {}",
                self.used_file, DEFAULT_USED_FILE
            ));
        }
        if !is_bare_name(&self.converter_script) {
            return Err(format!(
                "Invalid converter script name '{}'. The script must live inside the folder",
                self.converter_script
            ));
        }
        Ok(())
    }

    /// True when the process should serve HTTP instead of a one-shot command
    pub fn serve_mode(&self) -> bool {
        !self.list && !self.rename
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn converter(&self) -> ScriptConverter {
        ScriptConverter::new(self.converter_shell.clone(), self.converter_script.clone())
    }
}


// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            host: "127.0.0.1".to_string(),
            port: 8765,
            used_file: DEFAULT_USED_FILE.to_string(),
            converter_shell: DEFAULT_CONVERTER_SHELL.to_string(),
            converter_script: DEFAULT_CONVERTER_SCRIPT.to_string(),
            config_file: None,
            verbose: false,
            list: false,
            only_unused: false,
            rename: false,
            dry_run: false,
        }
    }
}
