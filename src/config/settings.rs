//! User settings for the layout engine
//!
//! Stored as JSON in the platform config directory. Every field has a default
//! so partial files keep working after new settings are added.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

use crate::constants;
use crate::grid::{GridMetrics, GridSpec, VisibleWindow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub grid: GridSpec,
    #[serde(default)]
    pub metrics: GridMetrics,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_virtualization_threshold")]
    pub virtualization_threshold: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Override for the local layout data file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
}

fn default_debounce_ms() -> u64 {
    constants::persistence::DEBOUNCE_MS
}

fn default_history_limit() -> usize {
    constants::history::LIMIT
}

fn default_virtualization_threshold() -> usize {
    constants::virtualization::THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user_id() -> String {
    "local".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            metrics: GridMetrics::default(),
            debounce_ms: default_debounce_ms(),
            history_limit: default_history_limit(),
            virtualization_threshold: default_virtualization_threshold(),
            log_level: default_log_level(),
            user_id: default_user_id(),
            data_file: None,
        }
    }
}

/// Runtime knobs handed to the layout controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub grid: GridSpec,
    pub debounce: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Settings::default().engine()
    }
}

impl Settings {
    fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(constants::config::APP_DIR);
        path
    }

    pub fn path() -> PathBuf {
        Self::config_dir().join(constants::config::FILENAME)
    }

    /// Load settings from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, creating defaults");
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {:?}", path))?;
        Ok(settings)
    }

    /// Log level of an existing settings file. Read before logging is set
    /// up, so a missing or unreadable file is silently skipped
    pub fn stored_level(path: &Path) -> Option<Level> {
        let contents = fs::read_to_string(path).ok()?;
        let settings: Settings = serde_json::from_str(&contents).ok()?;
        Some(settings.tracing_level())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings to JSON")?;
        fs::write(path, json).with_context(|| format!("Failed to write settings to {:?}", path))?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Where the local layout server keeps its data
    pub fn data_path(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join(constants::config::DATA_FILENAME))
    }

    pub fn engine(&self) -> EngineSettings {
        EngineSettings {
            grid: self.grid,
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    /// Scroll window honoring the configured virtualization threshold
    pub fn visible_window(&self, scroll_top: f32, height: f32) -> VisibleWindow {
        VisibleWindow {
            threshold: self.virtualization_threshold,
            ..VisibleWindow::new(scroll_top, height)
        }
    }

    pub fn tracing_level(&self) -> Level {
        parse_level(&self.log_level)
    }
}

/// Parse a log level name, falling back to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
