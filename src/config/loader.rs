use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::system::{FileSystemInterface, StandardFileSystem};

use super::types::Config;

const CONFIG_RELATIVE_PATH: &str = ".config/volume-hud-engine/config.toml";

/// Reads and writes the engine's TOML settings file
pub struct ConfigLoader<F: FileSystemInterface> {
    file_system: F,
    config_path: PathBuf,
}

impl<F: FileSystemInterface> ConfigLoader<F> {
    pub fn new(file_system: F, config_path: PathBuf) -> Self {
        Self {
            file_system,
            config_path,
        }
    }

    /// Parsed and validated settings. A missing file yields the defaults,
    /// which are written out for the user to edit.
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config_path.as_path();
        if !self.file_system.config_file_exists(path) {
            info!("No settings at {}, using defaults", path.display());
            self.write_defaults();
            return Ok(Config::default());
        }

        let text = self
            .file_system
            .read_config_file(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config = parse_settings(&text).with_context(|| format!("In {}", path.display()))?;

        debug!("Settings loaded from {}", path.display());
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let path = self.config_path.as_path();
        if let Some(dir) = path.parent() {
            self.file_system
                .create_config_dir(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }

        let text = toml::to_string_pretty(config).context("Cannot serialize settings")?;
        self.file_system
            .write_config_file(path, &text)
            .with_context(|| format!("Cannot write {}", path.display()))?;

        info!("Settings written to {}", path.display());
        Ok(())
    }

    /// Re-read on SIGHUP; the caller keeps its current settings on error
    pub fn reload_config(&self) -> Result<Config> {
        debug!("Re-reading settings from {}", self.config_path.display());
        self.load_config()
    }

    /// Whether the file on disk is newer than `since`. A missing file counts
    /// as unmodified.
    pub fn is_config_modified(&self, since: SystemTime) -> Result<bool> {
        if !self.file_system.config_file_exists(&self.config_path) {
            return Ok(false);
        }
        let modified = self
            .file_system
            .get_config_modified_time(&self.config_path)?;
        Ok(modified > since)
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    fn write_defaults(&self) {
        if let Err(e) = self.save_config(&Config::default()) {
            warn!("Defaults not saved: {:#}", e);
        }
    }
}

impl ConfigLoader<StandardFileSystem> {
    pub fn new_production(config_path: PathBuf) -> Self {
        Self::new(StandardFileSystem, config_path)
    }

    /// `~/.config/volume-hud-engine/config.toml` unless a path is given
    pub fn from_optional_path(config_path: Option<PathBuf>) -> Result<Self> {
        let path = match config_path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        Ok(Self::new_production(path))
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("No home directory")?;
        Ok(home.join(CONFIG_RELATIVE_PATH))
    }
}

fn parse_settings(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text).context("Malformed settings")?;
    config.validate().context("Invalid settings")?;
    Ok(config)
}
