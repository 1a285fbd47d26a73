//! Configuration types for DataStories.
//!
//! This module provides the [`Config`] struct which stores user preferences.
//! Configuration is persisted as TOML (typically at
//! `~/.config/datastories/config.toml` on Unix systems).
//!
//! # Key Configuration Fields
//!
//! - `timeline_path`: where the serialized timeline is kept
//! - `timeline.rapid_succession_ms`: window under which two captures count as one action
//! - `timeline.mark_new_moments`, `timeline.start_title`, `timeline.moment_title_prefix`,
//!   `timeline.narrative_prompt`: defaults for freshly captured moments
//!
//! # Example
//!
//! ```ignore
//! use datastories_core::config::Config;
//!
//! let config = Config::load()?;
//! let timeline = Timeline::with_settings(config.timeline.clone());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoryError};

/// Two captures closer together than this are offered for compaction.
pub const DEFAULT_RAPID_SUCCESSION_MS: i64 = 100;

/// Defaults a [`Timeline`](crate::timeline::Timeline) applies to new moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Window (milliseconds) under which consecutive captures are rapid succession
    pub rapid_succession_ms: i64,

    /// Whether newly captured moments start out as markers
    pub mark_new_moments: bool,

    /// Title of the first moment
    pub start_title: String,

    /// Prefix of numbered titles ("Moment 3")
    pub moment_title_prefix: String,

    /// Narrative new moments start with
    pub narrative_prompt: String,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            rapid_succession_ms: DEFAULT_RAPID_SUCCESSION_MS,
            mark_new_moments: true,
            start_title: "start".to_string(),
            moment_title_prefix: "Moment".to_string(),
            narrative_prompt: "What did you do? Why did you do it?\n¿Qué hizo? ¿Por qué?".to_string(),
        }
    }
}

/// `Config` is a data structure that represents the parts of DataStories that the user can configure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where the serialized timeline lives.
    /// Falls back to the platform data directory if not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline_path: Option<PathBuf>,

    /// Defaults for new moments and compaction
    #[serde(default)]
    pub timeline: TimelineSettings,
}

impl Config {
    /// Create a config that keeps its timeline at the given path
    pub fn new(timeline_path: PathBuf) -> Self {
        Self {
            timeline_path: Some(timeline_path),
            timeline: TimelineSettings::default(),
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| StoryError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| StoryError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Load config from a path, returning the default if it is missing or unreadable.
    pub fn load_from_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config ({}): {}", path.display(), e);
                Self::default()
            }
        }
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/datastories/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("datastories").join("config.toml"))
    }

    /// The configured timeline path, or the platform default
    /// (~/.local/share/datastories/timeline.json on Linux).
    pub fn resolved_timeline_path(&self) -> Option<PathBuf> {
        self.timeline_path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("datastories").join("timeline.json"))
        })
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(Config::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(StoryError::NoConfigDir)?;
        self.save_to(&path)
    }
}
