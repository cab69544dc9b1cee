use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::{
    media::DEFAULT_CATEGORY,
    shared::{default_data_file, settings_file},
};

/// User settings, read from `settings.json` in the platform config directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_file: Option<PathBuf>,
    /// ALSA PCM name.
    pub device: String,
    pub default_category: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: None,
            device: "default".into(),
            default_category: DEFAULT_CATEGORY,
        }
    }
}

impl Settings {
    /// Never fails: a missing file yields defaults, a broken one defaults plus a warning.
    pub fn load() -> Self {
        match settings_file() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }

        Self::read(path).unwrap_or_else(|e| {
            warn!("Ignoring settings at {}: {e:#}", path.display());
            Self::default()
        })
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).context("read settings")?;
        let settings = serde_json::from_str(&raw).context("parse settings")?;
        Ok(settings)
    }

    /// The command-line path wins over the configured one, which wins over the default.
    pub fn resolve_data_file(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.data_file.clone())
            .unwrap_or_else(default_data_file)
    }
}
