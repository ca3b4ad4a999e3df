use crate::cli::Args;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// JSON configuration file format
///
/// ```json
/// { "dir": "D:/covers", "port": 9000, "converterShell": "pwsh" }
/// ```
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub dir: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub used_file: Option<String>,
    pub converter_shell: Option<String>,
    pub converter_script: Option<String>,
    pub verbose: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

/// Whether any of `names` was given on the command line, as `--flag value`
/// or `--flag=value`
fn flag_given(cli_args: &[String], names: &[&str]) -> bool {
    cli_args.iter().any(|arg| {
        names.iter().any(|name| {
            arg.as_str() == *name
                || (name.starts_with("--") && arg.starts_with(&format!("{}=", name)))
        })
    })
}

impl Args {
    /// Load configuration from a JSON file and merge with command-line arguments
    /// Command-line arguments take precedence over config file values
    pub fn load_and_merge_config(&mut self) -> Result<()> {
        if let Some(config_path) = self.config_file.clone() {
            let config = ConfigFile::load(&config_path)?;
            let cli_args = std::env::args().collect::<Vec<_>>();
            self.merge_from_config(config, &cli_args);

            tracing::debug!("Loaded configuration from: {:?}", config_path);
        }
        Ok(())
    }

    pub fn merge_from_config(&mut self, config: ConfigFile, cli_args: &[String]) {
        if !flag_given(cli_args, &["-d", "--dir"]) {
            if let Some(dir) = config.dir {
                self.dir = PathBuf::from(dir);
            }
        }

        if !flag_given(cli_args, &["--host"]) {
            if let Some(host) = config.host {
                self.host = host;
            }
        }

        if !flag_given(cli_args, &["-p", "--port"]) {
            if let Some(port) = config.port {
                self.port = port;
            }
        }

        if !flag_given(cli_args, &["--used-file"]) {
            if let Some(used_file) = config.used_file {
                self.used_file = used_file;
            }
        }

        if !flag_given(cli_args, &["--converter-shell"]) {
            if let Some(shell) = config.converter_shell {
                self.converter_shell = shell;
            }
        }

        if !flag_given(cli_args, &["--converter-script"]) {
            if let Some(script) = config.converter_script {
                self.converter_script = script;
            }
        }

        // Boolean flags - only apply if currently false (default)
        if !self.verbose {
            self.verbose = config.verbose.unwrap_or(false);
        }
    }
}
