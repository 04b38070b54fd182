//! Application settings persisted as a JSON document
//!
//! Loaded once at startup with hard-coded defaults on a missing or corrupt
//! file; individual keys are settable and persisted immediately.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fetcher::Quality;
use crate::transcode::TranscodePolicy;

/// User preferences for the application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory downloads are written to
    pub downloads_dir: PathBuf,

    /// Preferred quality selector
    pub quality: Quality,

    /// Post-processing policy
    pub transcode_policy: TranscodePolicy,

    /// Dark mode flag (consumed by a front end, persisted here)
    pub dark_mode: bool,

    /// Window geometry (consumed by a front end, persisted here)
    pub window_x: i32,
    pub window_y: i32,
    pub window_width: u32,
    pub window_height: u32,

    /// BCP 47 language tag
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            downloads_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads")),
            quality: Quality::Auto,
            transcode_policy: TranscodePolicy::ProbeIncompatible,
            dark_mode: false,
            window_x: 100,
            window_y: 100,
            window_width: 700,
            window_height: 280,
            language: "vi".to_string(),
        }
    }
}

/// Loads and saves [`Settings`] to a JSON file under the user config dir
#[derive(Debug, Clone)]
pub struct SettingsStore {
    config_file: PathBuf,
}

impl SettingsStore {
    /// Store rooted at the platform config directory
    /// (`~/.config/vidloader/settings.json` on Linux).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("vidloader");
        Self::with_dir(&config_dir)
    }

    /// Store rooted at an explicit directory (used by tests)
    pub fn with_dir(config_dir: &Path) -> Self {
        Self {
            config_file: config_dir.join("settings.json"),
        }
    }

    /// Load settings, falling back to defaults on a missing or corrupt file
    pub fn load(&self) -> Settings {
        match fs::read_to_string(&self.config_file) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Corrupt settings file, using defaults: {}", e);
                    Settings::default()
                }
            },
            Err(_) => {
                debug!("No settings file at {}, using defaults", self.config_file.display());
                Settings::default()
            }
        }
    }

    /// Persist the full settings document
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_file, json)
            .with_context(|| format!("Failed to write {}", self.config_file.display()))?;
        Ok(())
    }

    /// Apply a single mutation and persist immediately
    pub fn set<F>(&self, mutate: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load();
        mutate(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::with_dir(temp.path());
        let settings = store.load();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_defaults_when_corrupt() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("settings.json"), "{not json").unwrap();
        let store = SettingsStore::with_dir(temp.path());
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::with_dir(temp.path());

        let mut settings = Settings::default();
        settings.dark_mode = true;
        settings.quality = Quality::Audio;
        settings.downloads_dir = PathBuf::from("/tmp/media");
        store.save(&settings).unwrap();

        let reloaded = store.load();
        assert!(reloaded.dark_mode);
        assert_eq!(reloaded.quality, Quality::Audio);
        assert_eq!(reloaded.downloads_dir, PathBuf::from("/tmp/media"));
    }

    #[test]
    fn test_set_persists_immediately() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::with_dir(temp.path());

        store.set(|s| s.window_width = 1024).unwrap();
        store.set(|s| s.language = "en".to_string()).unwrap();

        let settings = store.load();
        assert_eq!(settings.window_width, 1024);
        assert_eq!(settings.language, "en");
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("settings.json"),
            r#"{"dark_mode": true}"#,
        )
        .unwrap();
        let store = SettingsStore::with_dir(temp.path());
        let settings = store.load();
        assert!(settings.dark_mode);
        assert_eq!(settings.window_width, Settings::default().window_width);
    }
}
