//! Persisted form defaults.
//!
//! Stored as TOML under the OS config directory, or under
//! `IMAGE_OPTIMIZER_CONFIG_HOME` when set.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::request::{OptimizeOptions, Quality};

pub const APP_DIR_NAME: &str = "image-optimizer";
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const CONFIG_HOME_ENV: &str = "IMAGE_OPTIMIZER_CONFIG_HOME";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No suitable config directory available for settings")]
    NoConfigDir,
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: u8,
    pub optimize_palette: bool,
    pub force_jpeg: bool,
    pub last_input: Option<PathBuf>,
    pub last_output: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let options = OptimizeOptions::default();
        Self {
            quality: options.quality.get(),
            optimize_palette: options.optimize_palette,
            force_jpeg: options.force_jpeg,
            last_input: None,
            last_output: None,
        }
    }
}

impl Settings {
    pub fn options(&self) -> OptimizeOptions {
        OptimizeOptions {
            quality: Quality::clamped(self.quality),
            optimize_palette: self.optimize_palette,
            force_jpeg: self.force_jpeg,
        }
    }

    /// Loads from the default location, falling back to defaults when the
    /// file does not exist yet.
    pub fn load_or_default() -> Result<Self, SettingsError> {
        Self::load_from(&settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Self = toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.quality = Quality::clamped(settings.quality).get();
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let data = toml::to_string_pretty(self)?;
        fs::write(path, data).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn settings_path() -> Result<PathBuf, SettingsError> {
    let base = match std::env::var_os(CONFIG_HOME_ENV) {
        Some(path) => PathBuf::from(path),
        None => BaseDirs::new()
            .map(|dirs| dirs.config_dir().join(APP_DIR_NAME))
            .ok_or(SettingsError::NoConfigDir)?,
    };
    Ok(base.join(SETTINGS_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join(SETTINGS_FILE_NAME)).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.quality, 85);
        assert!(settings.optimize_palette);
        assert!(!settings.force_jpeg);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let settings = Settings {
            quality: 60,
            optimize_palette: false,
            force_jpeg: true,
            last_input: Some(PathBuf::from("/photos")),
            last_output: Some(PathBuf::from("/photos-small")),
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn out_of_range_quality_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "quality = 5\nforce_jpeg = true\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.quality, Quality::MIN);
        assert!(settings.force_jpeg);
        assert!(settings.optimize_palette);
        assert_eq!(settings.options().quality.get(), 30);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "quality = \"high\"").unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }
}
