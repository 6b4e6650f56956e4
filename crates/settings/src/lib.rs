//! Persisted tool settings.
//!
//! Only preferences live here. Loaded documents, arrangement and selection are
//! never written to disk.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use workbench::WorkbenchConfig;

const SETTINGS_SCHEMA_VERSION: u32 = 1;
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("settings schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub workbench: WorkbenchConfig,
    /// Directory exports go to when no output directory is given.
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: Settings,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn from_default_project() -> Result<Self, SettingsError> {
        let dirs = ProjectDirs::from("dev", "PdfWorkbench", "PdfWorkbench")
            .ok_or(SettingsError::NoDataDirectory)?;

        Ok(Self::with_root(dirs.data_local_dir()))
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self { path: root.as_ref().join(SETTINGS_FILE_NAME) }
    }

    /// Uses an explicit settings file instead of the standard location.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            log::debug!("no settings at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }

        let bytes = fs::read(&self.path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > SETTINGS_SCHEMA_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: envelope.version,
                supported: SETTINGS_SCHEMA_VERSION,
            });
        }

        Ok(envelope.settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let envelope =
            SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: settings.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(&self.path, bytes)?;
        log::info!("saved settings to {}", self.path.display());
        Ok(())
    }
}
