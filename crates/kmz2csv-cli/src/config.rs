//! Configuration loading for the kmz2csv CLI.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "kmz2csv.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: Option<PathBuf>,
    pub overwrite: Option<bool>,
}

impl Config {
    /// Load `path` if given (it must exist), else the default file if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output.as_ref().and_then(|output| output.dir.clone())
    }

    /// Overwrite existing CSV files. Defaults to false.
    pub fn overwrite(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|output| output.overwrite)
            .unwrap_or(false)
    }
}
