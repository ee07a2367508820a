//! src/config.rs
//! ============================================================================
//! # Config: Engine Configuration Loader and Saver (directories only)
//!
//! Loads and saves the engine settings as TOML from the proper
//! cross-platform config path using the [`directories`](https://docs.rs/directories)
//! crate.
//!
//! ## Features
//! - XDG-compliant config discovery and writing (Linux, macOS, Windows)
//! - Robust defaulting if no config file exists (the file is created)
//! - Missing keys fall back to their defaults
//! - Async load/save for smooth integration with Tokio
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! config.save().await?;
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing::info;

use crate::operators::trash::DEFAULT_TRASH_DIR;
use crate::operators::tree_copy::{CopyLimits, MAX_FILE_SIZE};

/// File-operation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling in bytes for any single file read or write.
    pub max_file_size: u64,

    /// Reserved directory under the root holding soft-deleted entries.
    pub trash_dir_name: String,

    pub default_items_per_page: usize,

    /// How many one-second steps a trash name may advance on collision.
    pub trash_name_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            trash_dir_name: DEFAULT_TRASH_DIR.to_string(),
            default_items_per_page: 50,
            trash_name_attempts: 60,
        }
    }
}

impl EngineConfig {
    pub fn limits(&self) -> CopyLimits {
        CopyLimits {
            max_file_size: self.max_file_size,
        }
    }
}

/// Logging settings consumed by [`crate::logging::Logger`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the rolling log files. `None` uses the platform data dir.
    pub log_dir: Option<PathBuf>,

    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,

    /// Mirror events to stderr.
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: "info".to_string(),
            stderr: false,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("org", "capdir", "capdir")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))
}

impl Config {
    /// Loads config from the XDG-compliant app config dir, or creates it
    /// with defaults.
    ///
    /// The config is expected at `$XDG_CONFIG_HOME/capdir/config.toml`
    /// (Linux), or equivalent on Windows/macOS.
    pub async fn load() -> anyhow::Result<Self> {
        let path: PathBuf = Self::config_path()?;
        Self::load_from(&path).await
    }

    /// Loads config from `path`, writing defaults there if it is missing.
    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        if TokioFs::try_exists(path).await.unwrap_or(false) {
            info!("Loading config from {}", path.display());

            let text: String = TokioFs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let cfg: Self =
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

            Ok(cfg)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config: Self = Self::default();
            default_config.save_to(path).await?;

            Ok(default_config)
        }
    }

    /// Saves config to the XDG-compliant app config dir.
    pub async fn save(&self) -> anyhow::Result<()> {
        let path: PathBuf = Self::config_path()?;
        self.save_to(&path).await
    }

    pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let toml_str: String = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the config directory (without filename).
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(project_dirs()?.config_dir().to_path_buf())
    }

    /// Platform data directory, home of logs and session settings.
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    /// Log directory, falling back to `<data dir>/logs`.
    pub fn log_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.logging.log_dir {
            Some(dir) => Ok(dir.clone()),

            None => Ok(Self::data_dir()?.join("logs")),
        }
    }
}
