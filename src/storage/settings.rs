//! Settings persistence.
//!
//! Handles saving and loading the controller configuration and named output
//! patterns to/from disk.
//! Cross-platform: uses appropriate config directories for each OS.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::ControllerConfig;
use crate::error::{Result, Usbdo96Error};
use crate::protocol::validate_channel;

// =============================================================================
// Config Path
// =============================================================================

const APP_NAME: &str = "usbdo96";
const CONFIG_FILE: &str = "config.json";

/// Get the configuration directory path.
/// - Linux: ~/.config/usbdo96/
/// - Windows: %APPDATA%\usbdo96\
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .ok_or_else(|| Usbdo96Error::Config("Could not find config directory".into()))
}

/// Get the full path to the config file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

// =============================================================================
// Storage Structures
// =============================================================================

/// Main configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serial and teardown settings
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Named sets of channels to switch on together
    #[serde(default)]
    pub patterns: BTreeMap<String, Vec<u8>>,
}

impl AppConfig {
    /// Get a pattern by name (case-insensitive) as a channel set.
    pub fn pattern(&self, name: &str) -> Result<BTreeSet<u8>> {
        self.patterns
            .get(&name.to_lowercase())
            .map(|channels| channels.iter().copied().collect())
            .ok_or_else(|| Usbdo96Error::InvalidInput(format!("Pattern '{}' not found", name)))
    }

    /// Store a pattern, replacing any pattern with the same name.
    pub fn set_pattern(&mut self, name: &str, channels: &BTreeSet<u8>) -> Result<()> {
        for &channel in channels {
            validate_channel(channel)?;
        }
        self.patterns
            .insert(name.to_lowercase(), channels.iter().copied().collect());
        Ok(())
    }
}

// =============================================================================
// Storage Functions
// =============================================================================

/// Load configuration from a file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to read config: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to parse config: {}", e)))
}

/// Save configuration to a file, creating its directory if needed.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| Usbdo96Error::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Load configuration from disk.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path()?)
}

/// Save configuration to disk.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}
