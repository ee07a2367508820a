//! src/settings.rs
//! ============================================================================
//! # Session settings persistence
//!
//! What a front end remembers between runs: page size, the last root and
//! when it was opened. Storage failures never break a session; callers go
//! through [`load_or_default`] and treat save errors as warnings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSettings {
    pub items_per_page: usize,

    /// Label shown for the root (the granted directory's display path).
    pub display_path: Option<String>,

    pub last_root: Option<PathBuf>,

    pub last_opened: Option<DateTime<Local>>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            items_per_page: 50,
            display_path: None,
            last_root: None,
            last_opened: None,
        }
    }
}

impl SessionSettings {
    pub fn with_items_per_page(items_per_page: usize) -> Self {
        Self {
            items_per_page: items_per_page.max(1),
            ..Self::default()
        }
    }

    /// Records that `root` was opened now.
    pub fn touch<P: Into<PathBuf>>(&mut self, root: P) {
        let root: PathBuf = root.into();

        self.display_path = Some(root.display().to_string());
        self.last_root = Some(root);
        self.last_opened = Some(Local::now());
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `None` when nothing was saved yet.
    async fn load(&self) -> CoreResult<Option<SessionSettings>>;

    async fn save(&self, settings: &SessionSettings) -> CoreResult<()>;

    async fn clear(&self) -> CoreResult<()>;
}

/// Loads settings, falling back to defaults on any failure.
pub async fn load_or_default(
    store: &dyn SettingsStore,
    default_items_per_page: usize,
) -> SessionSettings {
    match store.load().await {
        Ok(Some(mut settings)) => {
            settings.items_per_page = settings.items_per_page.max(1);
            settings
        }

        Ok(None) => SessionSettings::with_items_per_page(default_items_per_page),

        Err(e) => {
            warn!(error = %e, "Could not load session settings, using defaults");
            SessionSettings::with_items_per_page(default_items_per_page)
        }
    }
}

/// TOML file store. Writes go to a temp file first and are renamed into
/// place.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `settings.toml` under the platform data directory.
    pub fn default_location() -> anyhow::Result<Self> {
        Ok(Self::new(Config::data_dir()?.join("settings.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: std::ffi::OsString = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "settings.toml".into());
        name.push(".tmp");

        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsStore for TomlSettingsStore {
    async fn load(&self) -> CoreResult<Option<SessionSettings>> {
        let text: String = match TokioFs::read_to_string(&self.path).await {
            Ok(text) => text,

            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),

            Err(e) => return Err(AppError::Io(e)),
        };

        let settings: SessionSettings = toml::from_str(&text)?;
        debug!(path = %self.path.display(), "Session settings loaded");

        Ok(Some(settings))
    }

    async fn save(&self, settings: &SessionSettings) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let text: String = toml::to_string_pretty(settings)?;
        let temp: PathBuf = self.temp_path();

        TokioFs::write(&temp, text).await?;
        TokioFs::rename(&temp, &self.path).await?;

        info!(path = %self.path.display(), "Session settings saved");
        Ok(())
    }

    async fn clear(&self) -> CoreResult<()> {
        match TokioFs::remove_file(&self.path).await {
            Ok(()) => Ok(()),

            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),

            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_load_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = TomlSettingsStore::new(temp_dir.path().join("state").join("settings.toml"));

        assert!(store.load().await.unwrap().is_none());

        let mut settings = SessionSettings::with_items_per_page(20);
        settings.touch("/data/photos");
        store.save(&settings).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.items_per_page, 20);
        assert_eq!(loaded.last_root, Some(PathBuf::from("/data/photos")));
        assert!(loaded.last_opened.is_some());
        assert!(!store.temp_path().exists());

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        TokioFs::write(&path, "items_per_page = \"many\"").await.unwrap();
        let store = TomlSettingsStore::new(&path);

        assert!(matches!(store.load().await, Err(AppError::Config(_))));

        let settings = load_or_default(&store, 25).await;
        assert_eq!(settings.items_per_page, 25);
        assert!(settings.last_root.is_none());
    }
}
