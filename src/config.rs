use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{DumpError, Result};

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Directory where converted notes and attachments are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Whether attachments keep their (sanitized) original filenames
    #[serde(default)]
    pub keep_original_names: bool,

    /// Maximum width for persisted raster images (shrink only)
    #[serde(default = "default_max_image_width")]
    pub max_image_width: u32,

    /// Maximum height for persisted raster images (shrink only)
    #[serde(default = "default_max_image_height")]
    pub max_image_height: u32,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_image_width() -> u32 {
    1920
}

fn default_max_image_height() -> u32 {
    1080
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_dir: default_output_dir(),
            keep_original_names: false,
            max_image_width: default_max_image_width(),
            max_image_height: default_max_image_height(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or from the default location
    /// when no path is given. A missing default file yields the built-in
    /// defaults; an explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(DumpError::ConfigError {
                        message: format!("config file not found: {}", p.display()),
                    });
                }
                p.to_path_buf()
            }
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Config::default()),
            },
        };

        let raw = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Default configuration file location under the platform config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("enex2md").join("config.json"))
    }
}
